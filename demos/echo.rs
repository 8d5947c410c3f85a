//! Minimal echo client: subscribe to a topic, publish a greeting, and
//! print everything that comes back.
//!
//! ```sh
//! cargo run --example echo -- --url tcp://127.0.0.1:1883 --topic test/echo
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use photon::{Client, ConnectionSettings, Qos};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Simple MQTT echo client")]
struct Args {
    /// Broker url, tcp://host:port or tls://host:port
    #[arg(long, default_value = "tcp://127.0.0.1:1883")]
    url: String,
    /// MQTT client identifier (generated when omitted)
    #[arg(long)]
    client_id: Option<String>,
    /// Topic to publish to and subscribe on
    #[arg(long, default_value = "test/echo")]
    topic: String,
    /// PEM file containing the broker CA bundle (required for tls://)
    #[arg(long, value_name = "PATH")]
    ca_cert: Option<PathBuf>,
    /// Keep-alive interval in seconds
    #[arg(long, default_value_t = 30)]
    keep_alive: u16,
    /// Username for broker authentication
    #[arg(long)]
    username: Option<String>,
    /// Password for broker authentication
    #[arg(long)]
    password: Option<String>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();

    let mut client = Client::from_url(&args.url).context("parse broker url")?;
    if let Some(client_id) = args.client_id {
        client = client.with_client_id(client_id);
    }
    if let Some(ca_cert) = args.ca_cert {
        client = client.with_ca_file(ca_cert);
    }

    let mut settings = ConnectionSettings::new().keep_alive(args.keep_alive);
    if let Some(username) = args.username {
        settings = settings.username(username);
    }
    if let Some(password) = args.password {
        settings = settings.password(password.into_bytes());
    }

    client
        .connect(settings, true)
        .context("connect to broker")?;
    println!("connected as {}", client.client_id());

    client
        .subscribe(
            &args.topic,
            |topic: &str, payload: &[u8]| {
                println!("{topic}: {}", String::from_utf8_lossy(payload));
            },
            Qos::AtLeastOnce,
        )
        .context("subscribe to echo topic")?;
    client
        .publish(&args.topic, b"hello from photon", Qos::AtLeastOnce, false)
        .context("publish greeting")?;

    // The loop only returns on error; surface it.
    client.run(true).context("event loop")
}
