//! edit-config transaction example
//!
//! Connects to a NETCONF device, reads the running configuration, then
//! applies a configuration snippet as one lock/edit/validate/commit/unlock
//! transaction and prints every step's response as JSON.
//!
//! # Usage
//!
//! ```bash
//! # Read running config only
//! cargo run --example edit_config -- --host router1 --user admin --password secret
//!
//! # Apply a snippet from a file
//! cargo run --example edit_config -- --host router1 --user admin --password secret --config system.xml --validate
//! ```

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use netconf_executor::{Datastore, DeviceInfo, EditConfigOptions, NetconfRpcService};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    println!("=== netconf-executor edit-config Example ===\n");
    println!("Connecting to {}:{}...", args.host, args.port);

    let mut builder = DeviceInfo::builder(&args.host)
        .port(args.port)
        .username(&args.user)
        .reply_timeout(Duration::from_secs(args.timeout));

    if let Some(password) = &args.password {
        builder = builder.password(password);
    } else if let Some(key_path) = &args.key {
        builder = builder.private_key(key_path);
    } else {
        eprintln!("Error: Must provide either --password or --key");
        std::process::exit(1);
    }

    let service = NetconfRpcService::new(builder.build()?);
    service.connect().await?;

    let session = service.session();
    println!(
        "Connected! session-id {}, framing {:?}\n",
        session.session_id().unwrap_or_default(),
        session.framing()
    );
    println!("Device capabilities:");
    for capability in session.device_capabilities() {
        println!("  {}", capability);
    }

    let running = service.get_config(Datastore::Running, None).await;
    println!("\n--- running configuration ---\n{}", running);

    if let Some(path) = &args.config {
        let config = std::fs::read_to_string(path)?;
        let options = EditConfigOptions::default()
            .validate(args.validate)
            .discard_changes_on_commit_failure(true);

        println!("\n--- applying {} ---", path.display());
        let response = service.edit_config(&config, &options).await;
        println!("{}", serde_json::to_string_pretty(&response)?);
    }

    println!("\nClosing session...");
    service.disconnect().await?;
    println!("Done!");

    Ok(())
}

struct Args {
    host: String,
    port: u16,
    user: String,
    password: Option<String>,
    key: Option<PathBuf>,
    timeout: u64,
    config: Option<PathBuf>,
    validate: bool,
}

impl Args {
    fn parse() -> Self {
        let args: Vec<String> = env::args().collect();
        let mut host = "localhost".to_string();
        let mut port = 830u16;
        let mut user = env::var("USER").unwrap_or_else(|_| "admin".to_string());
        let mut password = None;
        let mut key = None;
        let mut timeout = 30u64;
        let mut config = None;
        let mut validate = false;

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--host" | "-h" => {
                    i += 1;
                    if i < args.len() {
                        host = args[i].clone();
                    }
                }
                "--port" | "-p" => {
                    i += 1;
                    if i < args.len() {
                        port = args[i].parse().unwrap_or(830);
                    }
                }
                "--user" | "-u" => {
                    i += 1;
                    if i < args.len() {
                        user = args[i].clone();
                    }
                }
                "--password" | "-P" => {
                    i += 1;
                    if i < args.len() {
                        password = Some(args[i].clone());
                    }
                }
                "--key" | "-k" => {
                    i += 1;
                    if i < args.len() {
                        key = Some(PathBuf::from(&args[i]));
                    }
                }
                "--timeout" | "-t" => {
                    i += 1;
                    if i < args.len() {
                        timeout = args[i].parse().unwrap_or(30);
                    }
                }
                "--config" | "-c" => {
                    i += 1;
                    if i < args.len() {
                        config = Some(PathBuf::from(&args[i]));
                    }
                }
                "--validate" => validate = true,
                "--help" => {
                    println!("Usage: edit_config [OPTIONS]");
                    println!();
                    println!("Options:");
                    println!("  -h, --host <HOST>         Device hostname or IP (default: localhost)");
                    println!("  -p, --port <PORT>         NETCONF SSH port (default: 830)");
                    println!("  -u, --user <USER>         Username (default: $USER)");
                    println!("  -P, --password <PASS>     Password");
                    println!("  -k, --key <PATH>          Private key file");
                    println!("  -t, --timeout <SECS>      Reply timeout in seconds (default: 30)");
                    println!("  -c, --config <PATH>       XML snippet to apply with edit-config");
                    println!("      --validate            Validate the candidate before commit");
                    std::process::exit(0);
                }
                _ => {}
            }
            i += 1;
        }

        Self {
            host,
            port,
            user,
            password,
            key,
            timeout,
            config,
            validate,
        }
    }
}
