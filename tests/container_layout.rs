//! Byte-level layout of containers and compatibility with hand-built ones.

use std::fs;
use std::path::Path;

use base64::{Engine, engine::general_purpose};
use encryptor::{
    CipherAlg, ContainerHeader, EncryptParams, EncryptorError, HEADER_LEN_PREFIX, KdfAlg,
    Operation, decrypt_file, derive_key, encrypt_file, write_header,
};
use secrecy::SecretString;
use tempfile::tempdir;

fn pw(s: &str) -> SecretString {
    SecretString::new(s.into())
}

fn split_container(bytes: &[u8]) -> (ContainerHeader, &[u8]) {
    let n = u32::from_le_bytes(bytes[..HEADER_LEN_PREFIX].try_into().unwrap()) as usize;
    assert!(n > 0);
    let header =
        ContainerHeader::from_bytes(&bytes[HEADER_LEN_PREFIX..HEADER_LEN_PREFIX + n]).unwrap();
    (header, &bytes[HEADER_LEN_PREFIX + n..])
}

/// Build a container the way an external writer would, bypassing `encrypt_file`.
async fn handmade_container(
    path: &Path,
    header: &ContainerHeader,
    password: &str,
    plaintext: &[u8],
) {
    let cipher = CipherAlg::from_name(&header.cipher_algorithm).unwrap();
    let kdf = KdfAlg::from_name(&header.key_derivation_algorithm).unwrap();
    let key = derive_key(
        kdf,
        &pw(password),
        &header.salt,
        header.key_derivation_iterations,
        header.key_length,
    )
    .unwrap();
    let mut t = cipher.encryptor(&key, &header.initialization_vector).unwrap();
    let mut body = Vec::new();
    t.update(plaintext, &mut body);
    t.finish(&mut body).unwrap();

    let mut out = Vec::new();
    write_header(&mut out, header).await.unwrap();
    out.extend_from_slice(&body);
    fs::write(path, out).unwrap();
}

#[tokio::test]
async fn hello_world_container_layout() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("hello.txt");
    fs::write(&input, b"hello world").unwrap();

    let params = EncryptParams {
        kdf: KdfAlg::Pbkdf2Sha1,
        kdf_iterations: 1000,
        key_len: 32,
        salt_len: 16,
        ..EncryptParams::for_cipher(CipherAlg::Aes256Cbc)
    };
    let report = encrypt_file(&input, None, &pw("secret"), &params).await.unwrap();

    let bytes = fs::read(&report.output).unwrap();
    let (header, body) = split_container(&bytes);
    assert_eq!(header, report.header);
    assert_eq!(header.filename, "hello.txt");
    assert_eq!(header.operation, Operation::Encrypt);
    assert_eq!(header.cipher_algorithm, "aes-256-cbc");
    assert_eq!(header.key_derivation_algorithm, "pbkdf2-sha1");
    assert_eq!(header.key_derivation_iterations, 1000);
    assert_eq!(header.key_length, 32);
    assert_eq!(header.salt.len(), 16);
    assert_eq!(header.initialization_vector.len(), 16);
    // 11 bytes of plaintext pad to a single block.
    assert_eq!(body.len(), 16);

    fs::remove_file(&input).unwrap();
    let dec = decrypt_file(&report.output, &pw("secret")).await.unwrap();
    assert_eq!(fs::read(dec.output).unwrap(), b"hello world");
}

#[tokio::test]
async fn ciphertext_length_is_next_block_multiple() {
    let dir = tempdir().unwrap();
    let params = EncryptParams {
        kdf_iterations: 10,
        ..EncryptParams::for_cipher(CipherAlg::Aes128Cbc)
    };
    for len in [0usize, 1, 15, 16, 17, 32, 100] {
        let input = dir.path().join(format!("f{len}.bin"));
        fs::write(&input, vec![0xA5u8; len]).unwrap();
        let report = encrypt_file(&input, None, &pw("x"), &params).await.unwrap();
        let bytes = fs::read(&report.output).unwrap();
        let (_, body) = split_container(&bytes);
        assert_eq!(body.len(), (len / 16 + 1) * 16, "plaintext length {len}");
    }
}

#[tokio::test]
async fn salt_and_iv_are_fresh_per_container() {
    let dir = tempdir().unwrap();
    let params = EncryptParams {
        kdf_iterations: 10,
        ..EncryptParams::default()
    };
    let input = dir.path().join("same.txt");
    fs::write(&input, b"identical contents").unwrap();

    let a = encrypt_file(&input, Some(&dir.path().join("a.encrypted")), &pw("pw"), &params)
        .await
        .unwrap();
    let b = encrypt_file(&input, Some(&dir.path().join("b.encrypted")), &pw("pw"), &params)
        .await
        .unwrap();
    assert_ne!(a.header.salt, b.header.salt);
    assert_ne!(a.header.initialization_vector, b.header.initialization_vector);

    let ca = fs::read(&a.output).unwrap();
    let cb = fs::read(&b.output).unwrap();
    assert_ne!(split_container(&ca).1, split_container(&cb).1);
}

#[tokio::test]
async fn mixed_case_algorithm_names_in_header_are_accepted() {
    let dir = tempdir().unwrap();
    let header = ContainerHeader {
        filename: "data.csv".into(),
        operation: Operation::Encrypt,
        key_derivation_algorithm: "PBKDF2-SHA256".into(),
        key_derivation_iterations: 50,
        key_length: 24,
        salt: vec![1u8; 8],
        cipher_algorithm: "AES-192-CBC".into(),
        initialization_vector: vec![2u8; 16],
    };
    let container = dir.path().join("data.encrypted");
    handmade_container(&container, &header, "pw", b"a,b,c\n1,2,3\n").await;

    let dec = decrypt_file(&container, &pw("pw")).await.unwrap();
    assert_eq!(dec.output, dir.path().join("data.csv"));
    assert_eq!(fs::read(&dec.output).unwrap(), b"a,b,c\n1,2,3\n");
}

#[tokio::test]
async fn legacy_full_path_filename_restores_next_to_container() {
    let dir = tempdir().unwrap();
    let header = ContainerHeader {
        filename: r"C:\Users\someone\Documents\Test.pdf".into(),
        operation: Operation::Encrypt,
        key_derivation_algorithm: "pbkdf2-sha1".into(),
        key_derivation_iterations: 1000,
        key_length: 32,
        salt: vec![9u8; 16],
        cipher_algorithm: "aes-256-cbc".into(),
        initialization_vector: vec![4u8; 16],
    };
    let container = dir.path().join("Test.encrypted");
    let body: Vec<u8> = (0..70_000u32).map(|i| (i % 13) as u8).collect();
    handmade_container(&container, &header, "legacy", &body).await;

    let dec = decrypt_file(&container, &pw("legacy")).await.unwrap();
    assert_eq!(dec.output, dir.path().join("Test.pdf"));
    assert_eq!(fs::read(&dec.output).unwrap(), body);
}

#[tokio::test]
async fn header_marked_for_other_operation_is_rejected() {
    let dir = tempdir().unwrap();
    let header = ContainerHeader {
        filename: "x.txt".into(),
        operation: Operation::Decrypt,
        key_derivation_algorithm: "pbkdf2-sha256".into(),
        key_derivation_iterations: 10,
        key_length: 32,
        salt: vec![1u8; 16],
        cipher_algorithm: "aes-256-cbc".into(),
        initialization_vector: vec![0u8; 16],
    };
    let container = dir.path().join("x.encrypted");
    handmade_container(&container, &header, "pw", b"x").await;

    let err = decrypt_file(&container, &pw("pw")).await.unwrap_err();
    assert!(matches!(err, EncryptorError::MalformedHeader(_)), "{err:?}");
    assert!(!dir.path().join("x.txt").exists());
}

/// Containers from earlier releases name the AES provider instead of the key
/// size, use `rfc2898` for the KDF and store the full input path.
#[tokio::test]
async fn earlier_release_container_decrypts() {
    let dir = tempdir().unwrap();
    let salt = [0x5Au8; 16];
    let iv: Vec<u8> = (100u8..116).collect();
    let plaintext = b"%PDF-1.4 not really a pdf, but close enough\n";

    for (cipher_name, key_length, cipher) in [
        ("aescng", 32, CipherAlg::Aes256Cbc),
        ("AesManaged", 16, CipherAlg::Aes128Cbc),
    ] {
        let json = format!(
            concat!(
                r#"{{"Filename":"C:\\Users\\erik\\Documents\\Test.pdf","Operation":1,"#,
                r#""KeyDerivationAlgorithm":"rfc2898","KeyDerivationIterations":1000,"#,
                r#""KeyLength":{kl},"Salt":"{salt}","CipherAlgorithm":"{cipher}","#,
                r#""InitializationVector":"{iv}"}}"#,
            ),
            kl = key_length,
            salt = general_purpose::STANDARD.encode(salt),
            cipher = cipher_name,
            iv = general_purpose::STANDARD.encode(&iv),
        );

        // Rfc2898DeriveBytes is PBKDF2-HMAC-SHA1 over the UTF-8 password.
        let key = derive_key(KdfAlg::Pbkdf2Sha1, &pw("hunter2"), &salt, 1000, key_length).unwrap();
        let mut t = cipher.encryptor(&key, &iv).unwrap();
        let mut body = Vec::new();
        t.update(plaintext, &mut body);
        t.finish(&mut body).unwrap();

        let mut bytes = (json.len() as u32).to_le_bytes().to_vec();
        bytes.extend_from_slice(json.as_bytes());
        bytes.extend_from_slice(&body);
        let container = dir.path().join("Test.encrypted");
        fs::write(&container, bytes).unwrap();

        let dec = decrypt_file(&container, &pw("hunter2")).await.unwrap();
        assert_eq!(dec.output, dir.path().join("Test.pdf"));
        assert_eq!(fs::read(&dec.output).unwrap(), plaintext, "{cipher_name}");
        assert_eq!(dec.header.cipher().unwrap(), cipher);
        // Names are kept as read; they are only resolved, never rewritten.
        assert_eq!(dec.header.cipher_algorithm, cipher_name);

        fs::remove_file(&dec.output).unwrap();
        fs::remove_file(&container).unwrap();
    }
}
