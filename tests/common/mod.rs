#![allow(dead_code)]

use flate2::write::GzEncoder;
use openssl::hash::MessageDigest;
use openssl::pkcs5::bytes_to_key;
use openssl::symm::{Cipher, Crypter, Mode};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

pub fn tar_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (name, data) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, *data).unwrap();
    }
    builder.into_inner().unwrap()
}

pub fn zip_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default();
    for (name, data) in files {
        writer.start_file(*name, options).unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

pub fn bz2(data: &[u8]) -> Vec<u8> {
    let mut encoder = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

pub fn xz(data: &[u8]) -> Vec<u8> {
    let mut encoder = xz2::write::XzEncoder::new(Vec::new(), 6);
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// `openssl des3 -md md5 -k <passphrase>` output layout.
pub fn seal(plain: &[u8], passphrase: &str) -> Vec<u8> {
    let salt = *b"\x01\x23\x45\x67\x89\xab\xcd\xef";
    let cipher = Cipher::des_ede3_cbc();
    let key_iv = bytes_to_key(cipher, MessageDigest::md5(), passphrase.as_bytes(), Some(&salt), 1).unwrap();
    let mut crypter = Crypter::new(cipher, Mode::Encrypt, &key_iv.key, key_iv.iv.as_deref()).unwrap();
    let mut out = vec![0; plain.len() + cipher.block_size()];
    let mut count = crypter.update(plain, &mut out).unwrap();
    count += crypter.finalize(&mut out[count..]).unwrap();
    out.truncate(count);

    let mut sealed = b"Salted__".to_vec();
    sealed.extend_from_slice(&salt);
    sealed.extend_from_slice(&out);
    sealed
}

/// Writes `<root>/<device>/pkg/<name>` and returns its path.
pub fn module_in(root: &Path, device: &str, name: &str, content: &[u8]) -> PathBuf {
    let package = root.join(device).join("pkg");
    fs::create_dir_all(&package).unwrap();
    let path = package.join(name);
    fs::write(&path, content).unwrap();
    path
}
