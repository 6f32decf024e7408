use std::fs;
use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use encryptor::{
    CipherAlg, DEFAULT_CHUNK_SIZE, DEFAULT_KDF_ITERATIONS, DEFAULT_SALT_LEN, EncryptParams,
    KdfAlg, Report, decrypt_file_cancellable, encrypt_file_cancellable,
};
use secrecy::SecretString;
use tokio_util::sync::CancellationToken;

// encryptor -i ~/Temp/Test.pdf -o encrypt -c aes-256-cbc --kd pbkdf2-sha256 --kdi 600000
#[derive(Parser, Debug)]
#[command(
    name = "encryptor",
    version,
    about = "Encrypt a file into a password-protected container, or decrypt one"
)]
struct Cli {
    /// Input path: the plaintext file (encrypt) or the container (decrypt)
    #[arg(short = 'i', long = "input")]
    input: PathBuf,

    /// Operation to perform
    #[arg(short = 'o', long = "operation", value_enum, ignore_case = true)]
    operation: OperationArg,

    /// Cipher: aes-128-cbc, aes-192-cbc or aes-256-cbc
    #[arg(
        short = 'c',
        long = "cipher",
        default_value = "aes-256-cbc",
        value_parser = CipherAlg::from_name
    )]
    cipher: CipherAlg,

    /// Key derivation: pbkdf2-sha1, pbkdf2-sha256 or pbkdf2-sha512
    #[arg(
        long = "keyderivation",
        visible_alias = "kd",
        default_value = "pbkdf2-sha256",
        value_parser = KdfAlg::from_name
    )]
    kdf: KdfAlg,

    /// Key derivation iterations
    #[arg(long = "kditerations", visible_alias = "kdi", default_value_t = DEFAULT_KDF_ITERATIONS)]
    kdf_iterations: u32,

    /// Key length in bytes. Defaults to the cipher's key length.
    #[arg(long = "keylength", visible_alias = "kl")]
    key_len: Option<usize>,

    /// Salt length in bytes
    #[arg(long = "saltlength", visible_alias = "sl", default_value_t = DEFAULT_SALT_LEN)]
    salt_len: usize,

    /// Container path (encrypt only). If omitted, the input extension is replaced by ".encrypted".
    #[arg(long = "out")]
    output: Option<PathBuf>,

    /// Read size for the streaming loop (bytes)
    #[arg(long = "chunk-size", default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Read password from file instead of interactive prompt
    #[arg(short = 'p', long = "password-file")]
    password_file: Option<PathBuf>,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum OperationArg {
    Encrypt,
    Decrypt,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("interrupted, cancelling");
            on_signal.cancel();
        }
    });

    match cli.operation {
        OperationArg::Encrypt => cmd_encrypt(cli, &cancel).await,
        OperationArg::Decrypt => cmd_decrypt(cli, &cancel).await,
    }
}

fn read_password(password_file: &Option<PathBuf>, prompt: &str) -> Result<SecretString> {
    if let Some(path) = password_file {
        let mut s = String::new();
        fs::File::open(path)?.read_to_string(&mut s)?;

        let secret = SecretString::new(
            s.trim_end_matches(&['\r', '\n'][..]).to_owned().into_boxed_str(),
        );

        use zeroize::Zeroize;
        s.zeroize();
        Ok(secret)
    } else {
        let pw = rpassword::prompt_password(prompt)?;
        Ok(SecretString::new(pw.into_boxed_str()))
    }
}

async fn cmd_encrypt(cli: Cli, cancel: &CancellationToken) -> Result<()> {
    let params = EncryptParams {
        cipher: cli.cipher,
        kdf: cli.kdf,
        kdf_iterations: cli.kdf_iterations,
        key_len: cli.key_len.unwrap_or(cli.cipher.key_len()),
        salt_len: cli.salt_len,
        chunk_size: cli.chunk_size,
    };
    params.validate()?;

    let pw = read_password(&cli.password_file, "Enter password: ")?;
    let report = encrypt_file_cancellable(&cli.input, cli.output.as_deref(), &pw, &params, cancel)
        .await
        .with_context(|| format!("encryption of {} failed", cli.input.display()))?;

    print_report("Encryption", &report);
    Ok(())
}

async fn cmd_decrypt(cli: Cli, cancel: &CancellationToken) -> Result<()> {
    if cli.output.is_some() {
        anyhow::bail!(
            "--out is only valid for encryption; decrypted files are written next to the container"
        );
    }

    let pw = read_password(&cli.password_file, "Enter password: ")?;
    let report = decrypt_file_cancellable(&cli.input, &pw, cancel)
        .await
        .with_context(|| format!("decryption of {} failed", cli.input.display()))?;

    print_report("Decryption", &report);
    Ok(())
}

fn print_report(what: &str, report: &Report) {
    eprintln!("Wrote {}", report.output.display());
    eprintln!("{what} took {:.3} seconds.", report.elapsed.as_secs_f64());
}
