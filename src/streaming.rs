//! Container pipeline: the end-to-end encrypt and decrypt operations.
//!
//! Every operation moves through [`Stage`]s in order. Output is written to a
//! staging file next to the target and only moved into place, with create-new
//! semantics, after the last block has been written and synced. Any error or
//! cancellation drops the staging file, so no partial container or plaintext
//! is ever left at the target path.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;

use base64::{Engine, engine::general_purpose};
use log::{debug, info, warn};
use secrecy::SecretString;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use zeroize::Zeroizing;

use crate::crypto::{Transform, generate_iv, generate_salt};
use crate::file::{
    check_input_file, create_staging_file, decrypted_output_path, encrypted_output_path,
    ensure_absent, persist_new,
};
use crate::format::{ContainerHeader, Operation, read_header, write_header};
use crate::kdf::{DerivedKey, KeyDerivation};
use crate::registry::KdfAlg;
use crate::types::{DEFAULT_CHUNK_SIZE, EncryptParams, EncryptorError, Report};

/// Progress of a single encrypt or decrypt call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    HeaderBuilt,
    KeyDerived,
    Streaming,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Idle => "idle",
            Stage::HeaderBuilt => "header built",
            Stage::KeyDerived => "key derived",
            Stage::Streaming => "streaming",
            Stage::Done => "done",
        };
        f.write_str(s)
    }
}

fn advance(op: &str, stage: &mut Stage, next: Stage) {
    debug!("{op}: {stage} -> {next}");
    *stage = next;
}

/// Encrypt `input` into a new container.
///
/// The container goes to `output`, or next to the input with its extension
/// replaced by `.encrypted`. Fails with `OutputAlreadyExists` rather than
/// overwrite anything.
pub async fn encrypt_file(
    input: &Path,
    output: Option<&Path>,
    password: &SecretString,
    params: &EncryptParams,
) -> Result<Report, EncryptorError> {
    encrypt_file_cancellable(input, output, password, params, &CancellationToken::new()).await
}

/// [`encrypt_file`] that stops once `cancel` fires, during key
/// derivation or between chunks.
pub async fn encrypt_file_cancellable(
    input: &Path,
    output: Option<&Path>,
    password: &SecretString,
    params: &EncryptParams,
    cancel: &CancellationToken,
) -> Result<Report, EncryptorError> {
    let started = Instant::now();
    let mut stage = Stage::Idle;
    match encrypt_inner(input, output, password, params, cancel, &mut stage).await {
        Ok((output, header, plaintext_bytes)) => {
            advance("encrypt", &mut stage, Stage::Done);
            let elapsed = started.elapsed();
            info!("wrote encrypted file to {}", output.display());
            Ok(Report {
                output,
                header,
                plaintext_bytes,
                elapsed,
            })
        }
        Err(e) => {
            warn!("encrypt of {} failed while {stage}: {e}", input.display());
            Err(e)
        }
    }
}

async fn encrypt_inner(
    input: &Path,
    output: Option<&Path>,
    password: &SecretString,
    params: &EncryptParams,
    cancel: &CancellationToken,
    stage: &mut Stage,
) -> Result<(PathBuf, ContainerHeader, u64), EncryptorError> {
    params.validate()?;
    check_input_file(input)?;
    let out_path = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| encrypted_output_path(input));
    ensure_absent(&out_path)?;
    info!("output filename is {}", out_path.display());

    let cipher = params.cipher;
    cipher.check_key_len(params.key_len)?;
    let filename = input
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or(EncryptorError::InvalidArgument(
            "input file name must be valid UTF-8",
        ))?
        .to_owned();

    let mut header = ContainerHeader {
        filename,
        operation: Operation::Encrypt,
        key_derivation_algorithm: params.kdf.name().to_owned(),
        key_derivation_iterations: params.kdf_iterations,
        key_length: params.key_len,
        salt: Vec::new(),
        cipher_algorithm: cipher.name().to_owned(),
        initialization_vector: Vec::new(),
    };
    advance("encrypt", stage, Stage::HeaderBuilt);

    header.salt = generate_salt(params.salt_len)?;
    let key = derive_off_thread(
        params.kdf,
        password,
        &header.salt,
        header.key_derivation_iterations,
        header.key_length,
        cancel,
    )
    .await?;
    advance("encrypt", stage, Stage::KeyDerived);

    // Fresh IV for every container, generated before the header is written.
    header.initialization_vector = generate_iv(cipher)?;
    debug!(
        "salt {} iv {}",
        general_purpose::STANDARD.encode(&header.salt),
        general_purpose::STANDARD.encode(&header.initialization_vector)
    );
    let transform = cipher.encryptor(&key, &header.initialization_vector)?;
    drop(key);

    let mut infile = File::open(input).await?;
    let tmp = create_staging_file(&out_path)?;
    let mut outfile = File::from_std(tmp.reopen()?);
    write_header(&mut outfile, &header).await?;

    advance("encrypt", stage, Stage::Streaming);
    let n = pump(&mut infile, &mut outfile, transform, params.chunk_size, cancel).await?;
    outfile.flush().await?;
    outfile.sync_all().await?;
    drop(outfile);

    let out_path = persist_new(tmp, &out_path)?;
    Ok((out_path, header, n.consumed))
}

/// Decrypt `container` into a file named by its header, next to the container.
///
/// The key is derived from `password` and the salt, iteration count and KDF
/// recorded in the header. A wrong password is reported as `InvalidPadding`
/// in the vast majority of cases; the format carries no authentication tag,
/// so this is not guaranteed.
pub async fn decrypt_file(
    container: &Path,
    password: &SecretString,
) -> Result<Report, EncryptorError> {
    decrypt_file_cancellable(container, password, &CancellationToken::new()).await
}

/// [`decrypt_file`] that stops once `cancel` fires, during key
/// derivation or between chunks.
pub async fn decrypt_file_cancellable(
    container: &Path,
    password: &SecretString,
    cancel: &CancellationToken,
) -> Result<Report, EncryptorError> {
    let started = Instant::now();
    let mut stage = Stage::Idle;
    match decrypt_inner(container, password, cancel, &mut stage).await {
        Ok((output, header, plaintext_bytes)) => {
            advance("decrypt", &mut stage, Stage::Done);
            let elapsed = started.elapsed();
            info!("wrote decrypted file to {}", output.display());
            Ok(Report {
                output,
                header,
                plaintext_bytes,
                elapsed,
            })
        }
        Err(e) => {
            warn!("decrypt of {} failed while {stage}: {e}", container.display());
            Err(e)
        }
    }
}

async fn decrypt_inner(
    container: &Path,
    password: &SecretString,
    cancel: &CancellationToken,
    stage: &mut Stage,
) -> Result<(PathBuf, ContainerHeader, u64), EncryptorError> {
    check_input_file(container)?;
    let mut infile = File::open(container).await?;
    let header = read_header(&mut infile).await?;
    header.validate_for_decrypt()?;
    advance("decrypt", stage, Stage::HeaderBuilt);

    let out_path = decrypted_output_path(container, header.output_name()?);
    ensure_absent(&out_path)?;
    info!("output filename is {}", out_path.display());

    let cipher = header.cipher()?;
    cipher.check_key_len(header.key_length)?;
    let key = derive_off_thread(
        header.kdf()?,
        password,
        &header.salt,
        header.key_derivation_iterations,
        header.key_length,
        cancel,
    )
    .await?;
    advance("decrypt", stage, Stage::KeyDerived);
    debug!(
        "iv {}",
        general_purpose::STANDARD.encode(&header.initialization_vector)
    );
    let transform = cipher.decryptor(&key, &header.initialization_vector)?;
    drop(key);

    let tmp = create_staging_file(&out_path)?;
    let mut outfile = File::from_std(tmp.reopen()?);

    advance("decrypt", stage, Stage::Streaming);
    let n = pump(&mut infile, &mut outfile, transform, DEFAULT_CHUNK_SIZE, cancel).await?;
    outfile.flush().await?;
    outfile.sync_all().await?;
    drop(outfile);

    let out_path = persist_new(tmp, &out_path)?;
    Ok((out_path, header, n.produced))
}

/// Run the key derivation on the blocking pool.
///
/// Returns `Cancelled` as soon as `cancel` fires; the derivation itself cannot
/// be interrupted and finishes in the background, its result discarded.
async fn derive_off_thread(
    kdf: KdfAlg,
    password: &SecretString,
    salt: &[u8],
    iterations: u32,
    key_len: usize,
    cancel: &CancellationToken,
) -> Result<DerivedKey, EncryptorError> {
    let password = password.clone();
    let salt = salt.to_vec();
    let task = tokio::task::spawn_blocking(move || {
        KeyDerivation::with_alg(kdf, &password, &salt, iterations).derive(key_len)
    });
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(EncryptorError::Cancelled),
        joined = task => joined.map_err(|e| EncryptorError::Io(std::io::Error::other(e)))?,
    }
}

struct Pumped {
    consumed: u64,
    produced: u64,
}

/// Push `reader` through `transform` into `writer`, `chunk_size` bytes at a time.
async fn pump<R, W>(
    reader: &mut R,
    writer: &mut W,
    mut transform: Box<dyn Transform + Send>,
    chunk_size: usize,
    cancel: &CancellationToken,
) -> Result<Pumped, EncryptorError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let chunk_size = chunk_size.max(1);
    let mut buf = Zeroizing::new(vec![0u8; chunk_size]);
    // Holds plaintext on the decrypt side.
    let mut out = Zeroizing::new(Vec::with_capacity(chunk_size + 16));
    let mut consumed = 0u64;
    let mut produced = 0u64;

    loop {
        if cancel.is_cancelled() {
            return Err(EncryptorError::Cancelled);
        }
        let n = reader.read(&mut buf[..]).await?;
        if n == 0 {
            break;
        }
        consumed += n as u64;
        out.clear();
        transform.update(&buf[..n], &mut out);
        writer.write_all(&out).await?;
        produced += out.len() as u64;
    }

    out.clear();
    transform.finish(&mut out)?;
    writer.write_all(&out).await?;
    produced += out.len() as u64;

    Ok(Pumped { consumed, produced })
}
