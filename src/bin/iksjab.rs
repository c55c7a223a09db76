/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use std::env;
use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

use iks_client::Client;
use iks_client::ClientError;
use iks_client::Config;
use iks_client::Event;
use iks_client::Jid;
use iks_client::RequestResult;
use iks_client::SessionState;
use iks_client::TcpTransport;

fn print_version() {
    println!("iksjab (iksemel) v{}", iks_client::VERSION);
}

fn print_usage() {
    println!(concat!(
        "Usage: iksjab [OPTIONS]\n",
        "This tool can communicate over XMPP.\n",
        "Options:\n",
        "  -j, --jid <JID>        Jabber ID\n",
        "  -c, --config <FILE>    Read the connection settings from a TOML file\n",
        "  -s, --server <HOST>    Connect to this host instead of the JID domain\n",
        "  -a, --anonymous        Log in anonymously without a password\n",
        "  -d, --debug            Print the protocol traffic\n",
        "  -h, --help             Display this help message and exit\n",
        "  -v, --version          Display the version and exit\n",
        "Report issues at https://github.com/meduketto/iksemel-rust/issues"
    ));
}

fn init_logging(debug: bool) {
    let filter = if debug {
        EnvFilter::new("iks_client=trace,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn session(config: Config) -> Result<(), ClientError> {
    let mut client = Client::builder(config, TcpTransport::new()).build()?;
    client.events().register("element-received", |event| {
        if let Event::ElementReceived(element) = event {
            println!("{element}");
        }
    });
    client.connect()?;

    let mut pinged = false;
    while client.poll()? {
        if !pinged && client.session_state() == SessionState::Established {
            pinged = true;
            let request = client.ping(None)?;
            request.response(|result| match result {
                RequestResult::Success(_) => println!("Server answered the ping"),
                RequestResult::Error { condition, .. } => {
                    println!("Ping failed: {condition}")
                }
                RequestResult::Timeout => println!("Ping timed out"),
            });
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let mut args = env::args();
    let mut jid: Option<Jid> = None;
    let mut config_file: Option<String> = None;
    let mut server: Option<String> = None;
    let mut anonymous = false;
    let mut debug = false;

    // Skip the first argument (program name)
    args.next();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-j" | "--jid" => {
                if let Some(value) = args.next() {
                    jid = match Jid::new(&value) {
                        Ok(jid) => Some(jid),
                        Err(err) => {
                            eprintln!("Error: {}", err);
                            return ExitCode::FAILURE;
                        }
                    };
                } else {
                    eprintln!("Error: Jabber ID expected after {arg}");
                    return ExitCode::FAILURE;
                }
            }
            "-c" | "--config" => {
                if let Some(value) = args.next() {
                    config_file = Some(value);
                } else {
                    eprintln!("Error: file name expected after {arg}");
                    return ExitCode::FAILURE;
                }
            }
            "-s" | "--server" => {
                if let Some(value) = args.next() {
                    server = Some(value);
                } else {
                    eprintln!("Error: host name expected after {arg}");
                    return ExitCode::FAILURE;
                }
            }
            "-a" | "--anonymous" => anonymous = true,
            "-d" | "--debug" => debug = true,
            "-h" | "--help" => {
                print_usage();
                return ExitCode::SUCCESS;
            }
            "-v" | "--version" => {
                print_version();
                return ExitCode::SUCCESS;
            }
            _ => {
                eprintln!("Error: unknown option {arg}");
                return ExitCode::FAILURE;
            }
        }
    }

    init_logging(debug);

    let mut config = match (config_file, jid) {
        (Some(path), jid) => match Config::load(&path) {
            Ok(mut config) => {
                if let Some(jid) = jid {
                    config.jid = jid;
                }
                config
            }
            Err(err) => {
                eprintln!("Error: {}", err);
                return ExitCode::FAILURE;
            }
        },
        (None, Some(jid)) => Config::new(jid),
        (None, None) => {
            eprintln!("Error: a Jabber ID or a configuration file is required");
            return ExitCode::FAILURE;
        }
    };
    if server.is_some() {
        config.server = server;
    }
    if anonymous {
        config.password = None;
    } else if config.password.is_none() {
        match rpassword::prompt_password("Password: ") {
            Ok(password) => config.password = Some(password),
            Err(err) => {
                eprintln!("Error: {}", err);
                return ExitCode::FAILURE;
            }
        }
    }

    match session(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {}", err);
            ExitCode::FAILURE
        }
    }
}
