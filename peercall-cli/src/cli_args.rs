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

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Peer-to-peer video call tools
///
/// Converts between email addresses and signaling identifiers, and runs a
/// complete call between two in-process clients.
#[derive(Parser, Debug)]
#[clap(name = "peercall")]
pub struct Opt {
    #[clap(subcommand)]
    pub mode: Mode,
}

#[derive(Subcommand, Debug)]
pub enum Mode {
    /// Print the signaling identifier for an email address.
    Encode(Encode),

    /// Print the email address a signaling identifier stands for.
    Decode(Decode),

    /// Run a scripted call between two loopback clients.
    Demo(Demo),
}

#[derive(Args, Debug, Clone)]
pub struct Encode {
    pub email: String,

    /// Refuse addresses that would not decode back unchanged.
    #[clap(long = "strict")]
    pub strict: bool,
}

#[derive(Args, Debug, Clone)]
pub struct Decode {
    pub id: String,
}

#[derive(Args, Debug, Clone, Default)]
pub struct Demo {
    /// Address the calling side signs in with.
    #[clap(long = "caller")]
    pub caller: Option<String>,

    /// Address the answering side signs in with.
    #[clap(long = "callee")]
    pub callee: Option<String>,

    /// YAML file with the demo settings; `PEERCALL_CONFIG` is used when absent.
    #[clap(long = "config")]
    pub config: Option<PathBuf>,
}
