//! ctoken - compressed token command line client
//!
//! Thin shell over [`CompressedTokenService`]: parses arguments, loads the
//! layered configuration, wires the HTTP state client and the local keypair
//! wallet, then runs one operation.

#![deny(unused_imports)]
#![deny(unused_mut)]
#![deny(unused_variables)]
#![warn(unused_must_use)]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use solana_sdk::pubkey::Pubkey;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use compressed_token_builder::config::{AppConfig, NetworkProfile};
use compressed_token_builder::metrics::metrics;
use compressed_token_builder::service::{CompressedTokenService, OperationReceipt, PreparedOperation};
use compressed_token_builder::state_client::{CompressedStateClient, PhotonClient};
use compressed_token_builder::tx_builder::{
    CompressAndReclaimRequest, CompressRequest, CreateMintRequest, DecompressRequest,
    MintToRequest, TransferRequest,
};
use compressed_token_builder::types::MintMetadata;
use compressed_token_builder::wallet::KeypairWallet;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long, env = "CTOKEN_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long, value_enum)]
    network: Option<NetworkProfile>,

    /// Overrides the network profile endpoint
    #[arg(long)]
    rpc_url: Option<String>,

    /// Keypair file used as fee payer and owner
    #[arg(long)]
    keypair: Option<String>,

    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// Print Prometheus metrics to stderr before exiting
    #[arg(long)]
    print_metrics: bool,

    /// Assemble and package without signing or submitting
    #[arg(long)]
    dry_run: bool,

    /// Use the Token-2022 program instead of SPL Token
    #[arg(long)]
    token_2022: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a mint with its compression pool
    CreateMint {
        #[arg(long)]
        decimals: Option<u8>,
        /// Mint and freeze authority; the wallet when omitted
        #[arg(long, value_parser = parse_pubkey)]
        authority: Option<Pubkey>,
        /// Token-2022 metadata name; enables the metadata path
        #[arg(long, requires_all = ["symbol", "uri"])]
        name: Option<String>,
        #[arg(long)]
        symbol: Option<String>,
        #[arg(long)]
        uri: Option<String>,
        /// Additional metadata entry as key=value, repeatable
        #[arg(long = "field", value_parser = parse_field)]
        fields: Vec<(String, String)>,
    },
    /// Mint compressed tokens
    MintTo {
        #[arg(long, value_parser = parse_pubkey)]
        mint: Pubkey,
        #[arg(long, value_parser = parse_pubkey)]
        to: Pubkey,
        #[arg(long)]
        amount: u64,
    },
    /// Transfer compressed tokens
    Transfer {
        #[arg(long, value_parser = parse_pubkey)]
        mint: Pubkey,
        #[arg(long, value_parser = parse_pubkey)]
        to: Pubkey,
        #[arg(long)]
        amount: u64,
    },
    /// Compress from the wallet's token account
    Compress {
        #[arg(long, value_parser = parse_pubkey)]
        mint: Pubkey,
        #[arg(long)]
        amount: u64,
        /// Owner of the compressed output; the wallet when omitted
        #[arg(long, value_parser = parse_pubkey)]
        to: Option<Pubkey>,
    },
    /// Decompress into the wallet's token account
    Decompress {
        #[arg(long, value_parser = parse_pubkey)]
        mint: Pubkey,
        #[arg(long)]
        amount: u64,
    },
    /// Close the wallet's token account for a mint
    Reclaim {
        #[arg(long, value_parser = parse_pubkey)]
        mint: Pubkey,
    },
    /// Compress the remaining balance, then close the account
    CompressAndReclaim {
        #[arg(long, value_parser = parse_pubkey)]
        mint: Pubkey,
        #[arg(long, default_value_t = 0)]
        amount: u64,
    },
    /// Compressed balances by mint
    Balances {
        #[arg(long, value_parser = parse_pubkey)]
        owner: Option<Pubkey>,
        #[arg(long, value_parser = parse_pubkey)]
        mint: Option<Pubkey>,
    },
    /// Conventional token accounts
    TokenAccounts {
        #[arg(long, value_parser = parse_pubkey)]
        owner: Option<Pubkey>,
    },
    /// Recent signatures for an address
    Signatures {
        #[arg(value_parser = parse_pubkey)]
        address: Pubkey,
    },
    /// Look up a compressed account by address
    Account {
        #[arg(value_parser = parse_pubkey)]
        address: Pubkey,
    },
    /// Print the effective configuration
    ShowConfig,
}

fn parse_pubkey(s: &str) -> Result<Pubkey, String> {
    Pubkey::from_str(s).map_err(|e| format!("invalid pubkey '{}': {}", s, e))
}

fn parse_field(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got '{}'", s))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose, args.json_logs)?;

    let mut config = AppConfig::load(args.config.as_deref())?;
    if let Some(network) = args.network {
        config.network.profile = network;
    }
    if let Some(url) = &args.rpc_url {
        config.network.rpc_url = Some(url.clone());
    }
    if let Some(path) = &args.keypair {
        config.wallet.keypair_path = path.clone();
    }
    if args.token_2022 {
        config.builder.token_program = spl_token_2022::id();
    }
    config.validate()?;

    let result = run(&args, &config).await;
    if args.print_metrics {
        eprintln!("{}", metrics().encode_text()?);
    }
    result
}

/// Initialize logging subsystem
fn init_logging(verbose: bool, json: bool) -> Result<()> {
    let env_filter = if verbose {
        "compressed_token_builder=debug,ctoken=debug,info"
    } else {
        "compressed_token_builder=info,ctoken=info,warn"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| env_filter.into());

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .try_init()?;
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()?;
    }
    Ok(())
}

async fn run(args: &Args, config: &AppConfig) -> Result<()> {
    if let Command::ShowConfig = args.command {
        println!("{}", toml::to_string_pretty(config)?);
        return Ok(());
    }

    info!(endpoint = %config.network.endpoint(), "Connecting");
    let client: Arc<dyn CompressedStateClient> =
        Arc::new(PhotonClient::new(config.to_photon_config()?)?);

    match &args.command {
        Command::Balances { owner, mint } => {
            let owner = owner_or_wallet(*owner, config)?;
            for balance in client
                .get_compressed_token_balances_by_owner(&owner, mint.as_ref())
                .await?
            {
                println!("{}  {}", balance.mint, balance.balance);
            }
            return Ok(());
        }
        Command::TokenAccounts { owner } => {
            let owner = owner_or_wallet(*owner, config)?;
            for account in client.get_token_accounts(&owner).await? {
                println!(
                    "{}  mint={}  amount={}{}",
                    account.address,
                    account.mint,
                    account.amount,
                    if account.frozen { "  frozen" } else { "" }
                );
            }
            return Ok(());
        }
        Command::Signatures { address } => {
            for sig in client.get_signatures_for_address(address).await? {
                println!(
                    "{}  slot={}  {}",
                    sig.signature,
                    sig.slot,
                    if sig.failed { "failed" } else { "ok" }
                );
            }
            return Ok(());
        }
        Command::Account { address } => {
            match client.get_compressed_account(address).await? {
                Some(account) => println!(
                    "hash={}  owner={}  lamports={}  tree={}  leaf={}  data={} bytes",
                    account.hash,
                    account.owner,
                    account.lamports,
                    account.merkle_tree,
                    account.leaf_index,
                    account.data.len()
                ),
                None => println!("No compressed account at {}", address),
            }
            return Ok(());
        }
        _ => {}
    }

    let keypair_path = config.wallet.resolved_keypair_path();
    let wallet = KeypairWallet::from_file(&keypair_path, client.clone())
        .with_context(|| format!("Failed to load wallet from {}", keypair_path.display()))?;
    info!(wallet = %wallet.pubkey(), "Wallet loaded");
    let service = CompressedTokenService::new(client, Arc::new(wallet), config.builder_settings());

    if args.dry_run {
        let prepared = prepare(&service, &args.command).await?;
        print_prepared(&prepared);
    } else {
        let receipt = execute(&service, &args.command).await?;
        print_receipt(&receipt);
    }
    Ok(())
}

fn owner_or_wallet(owner: Option<Pubkey>, config: &AppConfig) -> Result<Pubkey> {
    match owner {
        Some(owner) => Ok(owner),
        None => {
            let keypair =
                compressed_token_builder::wallet::read_keypair(&config.wallet.resolved_keypair_path())?;
            Ok(solana_sdk::signer::Signer::pubkey(&keypair))
        }
    }
}

fn create_mint_request(command: &Command) -> Option<CreateMintRequest> {
    let Command::CreateMint {
        decimals,
        authority,
        name,
        symbol,
        uri,
        fields,
    } = command
    else {
        return None;
    };
    let metadata = name.as_ref().map(|name| MintMetadata {
        name: name.clone(),
        symbol: symbol.clone().unwrap_or_default(),
        uri: uri.clone().unwrap_or_default(),
        additional: fields.clone(),
    });
    Some(CreateMintRequest {
        authority: *authority,
        decimals: *decimals,
        metadata,
    })
}

async fn prepare(service: &CompressedTokenService, command: &Command) -> Result<PreparedOperation> {
    let prepared = match command {
        Command::CreateMint { .. } => {
            let request = create_mint_request(command).context("create-mint arguments")?;
            service.prepare_create_mint(&request).await?
        }
        Command::MintTo { mint, to, amount } => {
            service
                .prepare_mint_to(&MintToRequest {
                    mint: *mint,
                    recipient: *to,
                    amount: *amount,
                    authority: None,
                })
                .await?
        }
        Command::Transfer { mint, to, amount } => {
            service
                .prepare_transfer(&TransferRequest {
                    mint: *mint,
                    recipient: *to,
                    amount: *amount,
                })
                .await?
        }
        Command::Compress { mint, amount, to } => {
            service
                .prepare_compress(&CompressRequest {
                    mint: *mint,
                    amount: *amount,
                    recipient: *to,
                })
                .await?
        }
        Command::Decompress { mint, amount } => {
            service
                .prepare_decompress(&DecompressRequest {
                    mint: *mint,
                    amount: *amount,
                })
                .await?
        }
        Command::Reclaim { mint } => service.prepare_reclaim_rent(mint).await?,
        Command::CompressAndReclaim { mint, amount } => {
            service
                .prepare_compress_and_reclaim(&CompressAndReclaimRequest {
                    mint: *mint,
                    amount: *amount,
                })
                .await?
        }
        _ => anyhow::bail!("Command does not build a transaction"),
    };
    Ok(prepared)
}

async fn execute(service: &CompressedTokenService, command: &Command) -> Result<OperationReceipt> {
    let receipt = match command {
        Command::CreateMint { .. } => {
            let request = create_mint_request(command).context("create-mint arguments")?;
            service.create_mint(&request).await?
        }
        Command::MintTo { mint, to, amount } => {
            service
                .mint_to(&MintToRequest {
                    mint: *mint,
                    recipient: *to,
                    amount: *amount,
                    authority: None,
                })
                .await?
        }
        Command::Transfer { mint, to, amount } => {
            service
                .transfer(&TransferRequest {
                    mint: *mint,
                    recipient: *to,
                    amount: *amount,
                })
                .await?
        }
        Command::Compress { mint, amount, to } => {
            service
                .compress(&CompressRequest {
                    mint: *mint,
                    amount: *amount,
                    recipient: *to,
                })
                .await?
        }
        Command::Decompress { mint, amount } => {
            service
                .decompress(&DecompressRequest {
                    mint: *mint,
                    amount: *amount,
                })
                .await?
        }
        Command::Reclaim { mint } => service.reclaim_rent(mint).await?,
        Command::CompressAndReclaim { mint, amount } => {
            service
                .compress_and_reclaim(&CompressAndReclaimRequest {
                    mint: *mint,
                    amount: *amount,
                })
                .await?
        }
        _ => anyhow::bail!("Command does not build a transaction"),
    };
    Ok(receipt)
}

fn print_prepared(prepared: &PreparedOperation) {
    println!("operation: {}", prepared.operation);
    if let Some(mint) = prepared.mint {
        println!("mint: {}", mint);
    }
    println!("instructions: {:?}", prepared.instructions);
    if let Some(change) = prepared.change_amount {
        println!("change: {}", change);
    }
    println!(
        "signers: {}",
        prepared
            .transaction
            .required_signers()
            .iter()
            .map(|k| k.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );
    for record in prepared.trace.steps() {
        println!("  {:?}: {}", record.step, record.detail);
    }
}

fn print_receipt(receipt: &OperationReceipt) {
    println!("operation: {}", receipt.operation);
    if let Some(mint) = receipt.mint {
        println!("mint: {}", mint);
    }
    println!("signature: {}", receipt.signature);
    println!("slot: {}", receipt.slot);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_field() {
        assert_eq!(
            parse_field("website=https://x").unwrap(),
            ("website".to_string(), "https://x".to_string())
        );
        assert!(parse_field("novalue").is_err());
    }

    #[test]
    fn test_cli_parses_transfer() {
        let mint = Pubkey::new_unique();
        let to = Pubkey::new_unique();
        let args = Args::try_parse_from([
            "ctoken",
            "--network",
            "local",
            "transfer",
            "--mint",
            &mint.to_string(),
            "--to",
            &to.to_string(),
            "--amount",
            "500",
        ])
        .unwrap();
        assert_eq!(args.network, Some(NetworkProfile::Local));
        assert!(matches!(
            args.command,
            Command::Transfer { amount: 500, .. }
        ));
    }

    #[test]
    fn test_cli_parses_token_2022_compress() {
        let mint = Pubkey::new_unique();
        let args = Args::try_parse_from([
            "ctoken",
            "--token-2022",
            "compress",
            "--mint",
            &mint.to_string(),
            "--amount",
            "7",
        ])
        .unwrap();
        assert!(args.token_2022);
        assert!(matches!(args.command, Command::Compress { amount: 7, .. }));
    }

    #[test]
    fn test_metadata_requires_symbol_and_uri() {
        assert!(Args::try_parse_from(["ctoken", "create-mint", "--name", "Token"]).is_err());
    }

    #[test]
    fn test_create_mint_request_from_flags() {
        let args = Args::try_parse_from([
            "ctoken",
            "create-mint",
            "--decimals",
            "6",
            "--name",
            "Token",
            "--symbol",
            "TKN",
            "--uri",
            "https://example.com/t.json",
            "--field",
            "website=https://example.com",
        ])
        .unwrap();
        let request = create_mint_request(&args.command).unwrap();
        assert_eq!(request.decimals, Some(6));
        let metadata = request.metadata.unwrap();
        assert_eq!(metadata.symbol, "TKN");
        assert_eq!(metadata.additional.len(), 1);
    }
}
