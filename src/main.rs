// Copyright 2023-2025 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use adac_host::cert::CertificateChain;
use adac_host::config::{Endpoint, HostConfig};
use adac_host::protocol::{Status, Tlv, PSA_LIFECYCLE};
use adac_host::session::{AuthOutcome, LcsOutcome, Session};
use adac_host::token::{sw_partition_extensions, SigningKey, TokenSigner};
use adac_host::transport::{connect_tcp, Transport};
use clap::Parser;
use std::error::Error;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
enum AdacHostCli {
    Discover(DiscoverArgs),
    Unlock(UnlockArgs),
    Lock(LockArgs),
    Lcs(LcsArgs),
}

#[derive(Debug, clap::Args)]
struct TargetArgs {
    /// JSON host configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Target endpoint, tcp:<host>:<port> or unix:<path>
    #[arg(short, long)]
    endpoint: Option<String>,
}

#[derive(Debug, clap::Args)]
#[command(author, version, long_about = None,
    about = "Query the capabilities of the target")]
struct DiscoverArgs {
    #[command(flatten)]
    target: TargetArgs,

    /// Record type to ask for (hex); repeat for more, omit for all
    #[arg(short, long, value_parser = parse_hex_u16)]
    type_id: Vec<u16>,
}

#[derive(Debug, clap::Args)]
#[command(author, version, long_about = None,
    about = "Authenticate to the target with the supplied certificate chain \
    and key, unlocking debug access")]
struct UnlockArgs {
    #[command(flatten)]
    target: TargetArgs,

    #[arg(long)]
    chain: Option<PathBuf>,

    #[arg(short, long)]
    key: Option<PathBuf>,

    /// Software partition to add to the token extensions; repeat for more
    #[arg(short, long)]
    sw_partition: Vec<u32>,
}

#[derive(Debug, clap::Args)]
#[command(author, version, long_about = None,
    about = "Relinquish debug access")]
struct LockArgs {
    #[command(flatten)]
    target: TargetArgs,
}

#[derive(Debug, clap::Args)]
#[command(author, version, long_about = None,
    about = "Request a lifecycle state change")]
struct LcsArgs {
    #[command(flatten)]
    target: TargetArgs,

    /// Requested lifecycle value (hex); omit to send an empty request
    #[arg(short, long, value_parser = parse_hex_u16)]
    lifecycle: Option<u16>,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let ok = match AdacHostCli::parse() {
        AdacHostCli::Discover(args) => report("discovery", discover(&args)),
        AdacHostCli::Unlock(args) => report("unlock", unlock(&args)),
        AdacHostCli::Lock(args) => report("lock", lock(&args)),
        AdacHostCli::Lcs(args) => report("lifecycle change", lcs(&args)),
    };

    if !ok {
        std::process::exit(1);
    }
}

fn report(what: &str, res: Result<(), Box<dyn Error>>) -> bool {
    match res {
        Ok(()) => {
            println!("{what} successful");
            true
        }
        Err(e) => {
            eprintln!("{what} failed: {e}");
            false
        }
    }
}

fn parse_hex_u16(s: &str) -> Result<u16, String> {
    u16::from_str_radix(s.trim_start_matches("0x"), 16).map_err(|e| format!("{s}: {e}"))
}

fn load_config(args: &TargetArgs) -> Result<HostConfig, Box<dyn Error>> {
    let mut cfg = match &args.config {
        Some(p) => HostConfig::load_json(&fs::read_to_string(p)?)?,
        None => HostConfig::default(),
    };

    if let Some(e) = &args.endpoint {
        cfg.endpoint = Some(e.clone());
        cfg.validate()?;
    }

    Ok(cfg)
}

fn open_session(cfg: &HostConfig) -> Result<Session<Box<dyn Transport>>, Box<dyn Error>> {
    let endpoint = cfg.endpoint()?.ok_or("no target endpoint configured")?;
    let timeout = cfg.timeout_ms.map(Duration::from_millis);

    let link: Box<dyn Transport> = match endpoint {
        Endpoint::Tcp(a) => Box::new(connect_tcp(&a, timeout)?),
        #[cfg(unix)]
        Endpoint::Unix(p) => Box::new(adac_host::transport::connect_unix(p, timeout)?),
        #[cfg(not(unix))]
        Endpoint::Unix(_) => return Err("unix endpoints are not available".into()),
    };

    Ok(Session::new(link, cfg.buffer_size)?.with_permissions(cfg.requested_permissions))
}

fn discover(args: &DiscoverArgs) -> Result<(), Box<dyn Error>> {
    let cfg = load_config(&args.target)?;
    let mut s = open_session(&cfg)?;

    let d = s.discover(&args.type_id)?;

    for r in d.records() {
        println!("0x{:04x}: {}", r.type_id, hex::encode(&r.value));
    }

    if let Ok((state, raw)) = d.lifecycle() {
        println!("lifecycle: {state:?} (0x{raw:04x})");
    }

    Ok(())
}

fn unlock(args: &UnlockArgs) -> Result<(), Box<dyn Error>> {
    let cfg = load_config(&args.target)?;

    let chain_path = args
        .chain
        .as_ref()
        .or(cfg.chain.as_ref())
        .ok_or("no certificate chain given")?;
    let key_path = args
        .key
        .as_ref()
        .or(cfg.key.as_ref())
        .ok_or("no key given")?;

    let blob = fs::read(chain_path)?;
    let chain = CertificateChain::parse(&blob, cfg.max_extensions)?;
    let key = SigningKey::load(key_path, chain.detect_cryptosystem()?)?;

    let mut s = open_session(&cfg)?;

    s.discover(&[])?;
    s.check_cryptosystem_support(key.key_type())?;

    let challenge = s.auth_start()?;

    if s.send_certificates(&chain)? == Status::Failure {
        return Err("certificate chain rejected by target".into());
    }

    let ext = sw_partition_extensions(&args.sw_partition)?;
    let token = s.prepare_token(&chain, &challenge, &key, &ext)?;

    match s.authenticate(&token)? {
        AuthOutcome::Granted => Ok(()),
        AuthOutcome::Denied(st) => Err(format!("token rejected by target ({st:?})").into()),
    }
}

fn lock(args: &LockArgs) -> Result<(), Box<dyn Error>> {
    let cfg = load_config(&args.target)?;
    let mut s = open_session(&cfg)?;

    s.discover(&[])?;

    match s.lock_debug()? {
        Status::Success => Ok(()),
        st => Err(format!("target answered {st:?}").into()),
    }
}

fn lcs(args: &LcsArgs) -> Result<(), Box<dyn Error>> {
    let cfg = load_config(&args.target)?;
    let mut s = open_session(&cfg)?;

    s.discover(&[])?;

    let request = args
        .lifecycle
        .map(|v| Tlv::new(PSA_LIFECYCLE, &v.to_le_bytes()));

    match s.change_lifecycle(request.as_ref())? {
        LcsOutcome::Applied => Ok(()),
        LcsOutcome::NotImplemented => Err("target does not implement LCS change".into()),
        LcsOutcome::Rejected(st) => Err(format!("request refused ({st:?})").into()),
    }
}
