// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-provider project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use rust_oidc_provider::crypto::keys::{generate_rsa_keypair, DEFAULT_RSA_KEY_BITS};

/// Generate an RS256 key pair for offline signing-key provisioning
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Output path for the public key PEM file
    #[clap(long, default_value = "./pub.key")]
    out_pub_key: PathBuf,

    /// Output path for the private key PEM file
    #[clap(long, default_value = "./private.key")]
    out_private_key: PathBuf,

    /// RSA key length in bits
    #[clap(long, default_value_t = DEFAULT_RSA_KEY_BITS)]
    length: usize,
}

fn main() -> Result<()> {
    let args = Args::parse();

    println!("Generating RSA key pair with {} bits...", args.length);

    let pair = generate_rsa_keypair(args.length).context("Failed to generate RSA key pair")?;

    // Write private key to file
    let mut private_file = File::create(&args.out_private_key).with_context(|| {
        format!(
            "Failed to create private key file at {:?}",
            args.out_private_key
        )
    })?;
    private_file
        .write_all(pair.private_pem.as_bytes())
        .context("Failed to write private key to file")?;

    // Write public key to file
    let mut public_file = File::create(&args.out_pub_key)
        .with_context(|| format!("Failed to create public key file at {:?}", args.out_pub_key))?;
    public_file
        .write_all(pair.public_pem.as_bytes())
        .context("Failed to write public key to file")?;

    println!("Private key written to: {:?}", args.out_private_key);
    println!("Public key written to: {:?}", args.out_pub_key);
    println!("Key id (kid): {}", pair.kid);
    println!();
    println!("The provider normally generates and rotates its own signing keys;");
    println!("use these files when provisioning key material out of band.");

    Ok(())
}
