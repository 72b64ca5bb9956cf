//! OpenSSL `enc` password envelopes: `Salted__` magic, 8 byte salt, then
//! DES-EDE3-CBC ciphertext keyed through `EVP_BytesToKey` with MD5.

use crate::error::{FwArchiveError, Result};
use openssl::hash::MessageDigest;
use openssl::pkcs5::bytes_to_key;
use openssl::symm::{Cipher, Crypter, Mode};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::Command;

pub const ENVELOPE_MAGIC: &[u8; 8] = b"Salted__";
pub const DEFAULT_PASSPHRASE: &str = "Dji123456";

const SALT_LEN: usize = 8;

/// True exactly when the file starts with the `Salted__` magic.
pub fn is_envelope_encrypted(path: &Path) -> std::io::Result<bool> {
    let mut file = fs::File::open(path)?;
    let mut magic = [0u8; ENVELOPE_MAGIC.len()];
    let mut filled = 0;

    while filled < magic.len() {
        match file.read(&mut magic[filled..])? {
            0 => return Ok(false),
            n => filled += n,
        }
    }

    Ok(&magic == ENVELOPE_MAGIC)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum DecryptBackend {
    /// Decrypt in-process with libcrypto
    #[default]
    Openssl,
    /// Run the `openssl des3` command
    Command,
}

pub trait Decryptor {
    /// Decrypt `input` into `output` and return the path to continue with.
    fn decrypt(&self, input: &Path, output: &Path, passphrase: &str) -> Result<PathBuf>;

    fn name(&self) -> &'static str;
}

#[derive(Debug, Default)]
pub struct OpensslDecryptor;

impl OpensslDecryptor {
    pub fn new() -> Self {
        Self
    }

    pub fn decrypt_bytes(&self, data: &[u8], passphrase: &str) -> Result<Vec<u8>> {
        if data.len() < ENVELOPE_MAGIC.len() + SALT_LEN || !data.starts_with(ENVELOPE_MAGIC) {
            return Err(FwArchiveError::Decryption {
                path: "envelope".to_string(),
                message: "missing Salted__ header".to_string(),
            });
        }

        let mut salt = [0u8; SALT_LEN];
        salt.copy_from_slice(&data[ENVELOPE_MAGIC.len()..ENVELOPE_MAGIC.len() + SALT_LEN]);
        let payload = &data[ENVELOPE_MAGIC.len() + SALT_LEN..];

        let cipher = Cipher::des_ede3_cbc();
        let key_iv = bytes_to_key(
            cipher,
            MessageDigest::md5(),
            passphrase.as_bytes(),
            Some(&salt),
            1,
        )?;

        let mut decrypter = Crypter::new(cipher, Mode::Decrypt, &key_iv.key, key_iv.iv.as_deref())?;
        let mut buf = vec![0; payload.len() + cipher.block_size()];
        let mut count = decrypter.update(payload, &mut buf)?;
        count += decrypter.finalize(&mut buf[count..])?;
        buf.truncate(count);

        Ok(buf)
    }
}

impl Decryptor for OpensslDecryptor {
    fn decrypt(&self, input: &Path, output: &Path, passphrase: &str) -> Result<PathBuf> {
        log::info!(
            "Decrypting {} into {} (des-ede3-cbc, md5)",
            input.display(),
            output.display()
        );

        let data = fs::read(input)?;
        let plain = self.decrypt_bytes(&data, passphrase).map_err(|e| match e {
            FwArchiveError::Decryption { message, .. } => FwArchiveError::Decryption {
                path: input.display().to_string(),
                message,
            },
            other => other,
        })?;

        fs::write(output, plain)?;

        if let Ok(modified_time) = fs::metadata(input).and_then(|m| m.modified()) {
            let _ = filetime::set_file_mtime(output, filetime::FileTime::from_system_time(modified_time));
        }

        Ok(output.to_path_buf())
    }

    fn name(&self) -> &'static str {
        "openssl"
    }
}

/// Shells out to an OpenSSL-compatible binary.
#[derive(Debug, Clone)]
pub struct CommandDecryptor {
    program: String,
}

impl CommandDecryptor {
    pub fn new<S: Into<String>>(program: S) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn command_args(&self, input: &Path, output: &Path, passphrase: &str) -> Vec<String> {
        vec![
            "des3".to_string(),
            "-md".to_string(),
            "md5".to_string(),
            "-d".to_string(),
            "-k".to_string(),
            passphrase.to_string(),
            "-in".to_string(),
            input.display().to_string(),
            "-out".to_string(),
            output.display().to_string(),
        ]
    }
}

impl Default for CommandDecryptor {
    fn default() -> Self {
        Self::new("openssl")
    }
}

impl Decryptor for CommandDecryptor {
    fn decrypt(&self, input: &Path, output: &Path, passphrase: &str) -> Result<PathBuf> {
        let args = self.command_args(input, output, passphrase);
        log::info!("{} {}", self.program, args.join(" "));

        let result = Command::new(&self.program)
            .args(&args)
            .output()
            .map_err(|e| FwArchiveError::ExternalTool {
                tool: self.program.clone(),
                message: e.to_string(),
            })?;

        if !result.status.success() {
            return Err(FwArchiveError::ExternalTool {
                tool: self.program.clone(),
                message: format!(
                    "{} while decrypting {}: {}",
                    result.status,
                    input.display(),
                    String::from_utf8_lossy(&result.stderr).trim()
                ),
            });
        }

        Ok(output.to_path_buf())
    }

    fn name(&self) -> &'static str {
        "command"
    }
}

pub fn create_decryptor(backend: DecryptBackend, openssl_binary: &str) -> Box<dyn Decryptor> {
    match backend {
        DecryptBackend::Openssl => Box::new(OpensslDecryptor::new()),
        DecryptBackend::Command => Box::new(CommandDecryptor::new(openssl_binary)),
    }
}
