use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "peerledger", about = "Peer-to-peer blockchain node")]
pub struct Opt {
    #[arg(long, global = true, help = "Path to a TOML configuration file")]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(name = "init", about = "Create and store the node identity")]
    Init {
        #[arg(long, help = "Passphrase protecting the identity key")]
        passphrase: String,
    },
    #[command(name = "start", about = "Run the node")]
    Start {
        #[arg(long, help = "Passphrase unlocking the identity key")]
        passphrase: String,
    },
    #[command(name = "send", about = "Sign a transaction and submit it to a node")]
    Send {
        #[arg(help = "Destination address")]
        to: String,
        #[arg(help = "Amount to transfer")]
        amount: u64,
        #[arg(long, default_value_t = 1, help = "Fee offered to the block builder")]
        fee: u64,
        #[arg(long, help = "Passphrase unlocking the identity key")]
        passphrase: String,
        #[arg(long, help = "Node endpoint to submit to (defaults to the configured listen address)")]
        node: Option<String>,
    },
    #[command(name = "balance", about = "Confirmed balance of an address")]
    Balance {
        #[arg(help = "Address to query (defaults to the node's own address)")]
        address: Option<String>,
    },
    #[command(name = "print-chain", about = "Print all blocks in the chain")]
    PrintChain,
    #[command(name = "peers", about = "List known peers")]
    Peers,
}
