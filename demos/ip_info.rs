use std::time::{Duration, Instant};

use peer_rpc::{json, Actions, CallOptions, Config, Facility, Proto, Testnet, TransportKind};

use clap::Parser;

use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// IP address to look up
    ip: String,
    /// Number of peers offering the service
    #[arg(long, default_value_t = 2)]
    peers: u16,
    /// Port of the first peer; the others use the following ports
    #[arg(long, default_value_t = 1337)]
    port: u16,
    /// Request timeout in milliseconds
    #[arg(long, default_value_t = 5000)]
    timeout: u64,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let testnet = Testnet::new();

    let _servers: Vec<Facility> = (0..cli.peers)
        .map(|i| {
            let port = cli.port + i;

            Facility::builder(
                Config {
                    svc_port: Some(port),
                    transport: Some(TransportKind::Http),
                    protos: vec![Proto::Gen],
                    services: vec!["rest:util:net".into()],
                    ..Default::default()
                },
                testnet.clone(),
            )
            .handler(Actions::new().action("getIpInfo", move |payload| {
                Ok(json!([payload.args.first(), { "country": "US", "region": "CA", "peer": port }]))
            }))
            .build()
            .expect("failed to start peer")
        })
        .collect();

    let client = Facility::builder(
        Config {
            transport: Some(TransportKind::Http),
            protos: vec![Proto::Gen],
            ..Default::default()
        },
        testnet,
    )
    .build()
    .expect("failed to start client");

    let options = CallOptions::default().timeout(Duration::from_millis(cli.timeout));

    println!("\n=== REQUEST ===");
    let start = Instant::now();
    match client.request("rest:util:net", "getIpInfo", json!([cli.ip]), options) {
        Ok(result) => println!("{result} in {:?}", start.elapsed()),
        Err(error) => println!("request failed: {error}"),
    }

    println!("\n=== MAP ===");
    let start = Instant::now();
    match client.map("rest:util:net", "getIpInfo", json!([cli.ip]), options) {
        Ok(result) => println!("{result} in {:?}", start.elapsed()),
        Err(error) => println!("map failed: {error}"),
    }

    client.shutdown();
}
