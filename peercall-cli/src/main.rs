/*
 * Copyright 2025 Security Union LLC
 *
 * Licensed under either of
 *
 * * Apache License, Version 2.0
 *   (http://www.apache.org/licenses/LICENSE-2.0)
 * * MIT license
 *   (http://opensource.org/licenses/MIT)
 *
 * at your option.
 *
 * Unless you explicitly state otherwise, any contribution intentionally
 * submitted for inclusion in the work by you, as defined in the Apache-2.0
 * license, shall be dual licensed as above, without any additional terms or
 * conditions.
 */

use clap::Parser;
use log::debug;
use peercall_types::{decode_peer_id, encode_peer_id, encode_peer_id_strict};

mod cli_args;
mod config;
mod demo;

use cli_args::{Demo, Mode, Opt};
use config::DemoConfig;

fn load_demo_config(args: &Demo) -> anyhow::Result<DemoConfig> {
    let mut config = match &args.config {
        Some(path) => DemoConfig::from_file(path)?,
        None => DemoConfig::from_env_or_default()?,
    };
    if let Some(caller) = &args.caller {
        config.caller = caller.clone();
    }
    if let Some(callee) = &args.callee {
        config.callee = callee.clone();
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let opt = Opt::parse();
    match opt.mode {
        Mode::Encode(args) => {
            let id = if args.strict {
                encode_peer_id_strict(&args.email)?
            } else {
                encode_peer_id(&args.email)
            };
            println!("{id}");
        }
        Mode::Decode(args) => {
            println!("{}", decode_peer_id(&args.id));
        }
        Mode::Demo(args) => {
            let config = load_demo_config(&args)?;
            debug!("Demo config: {config:?}");
            demo::run(config).await?;
        }
    };

    Ok(())
}
