use clap::Parser;
use replidis::config::{Config, PrimaryAddr};
use replidis::{server, Error};

const PORT: u16 = 6379;

#[derive(Parser, Debug)]
struct Args {
    /// The port to listen on
    #[arg(long, default_value_t = PORT, value_parser = clap::value_parser!(u16).range(1..))]
    port: u16,

    /// Start in the replica role, attached to the primary at "<host> <port>"
    #[arg(long, value_name = "\"HOST PORT\"")]
    replicaof: Option<PrimaryAddr>,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let args = Args::parse();

    server::run(Config {
        port: args.port,
        replicaof: args.replicaof,
    })
    .await
}
