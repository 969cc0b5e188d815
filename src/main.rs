// ---- Clippy/lints: keep signals high, noise low ----
#![allow(clippy::module_name_repetitions)]

use std::path::PathBuf;
use std::sync::Arc;

use alloy_primitives::Address;
use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};

use amipay_core::address::parse_address;
use amipay_core::chain::{ChainClient, EvmChainClient, RpcClient};
use amipay_core::config::{AppConfig, ResolvedConfig, DEFAULT_CONFIG_FILE};
use amipay_core::logging;
use amipay_core::priority::PriorityBook;
use amipay_core::store::SledStore;
use amipay_core::wallet::WalletSettings;
use amipay_core::{parse_payment_qr, FundingSource, WalletController};

#[derive(Parser, Debug)]
#[command(name = "amipay", version, about = "AmiPay wallet core CLI")]
struct Cli {
    /// Config file (TOML); defaults apply when it does not exist
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Decode an amipay:// QR payload and print it as JSON
    Parse {
        /// Raw text from the scanner
        text: String,
    },

    /// Stablecoin balance of an account
    Balance {
        #[arg(long)]
        account: String,
    },

    /// Show or change the funding-source priority
    Priority {
        #[command(subcommand)]
        cmd: PriorityCmd,
    },

    /// Pay a scanned payment request
    Pay {
        /// Paying account (must be unlocked on the RPC node)
        #[arg(long)]
        account: String,

        /// Raw amipay:// text
        qr: String,
    },

    /// Give a friend a sponsor allowance
    Fund {
        #[arg(long)]
        account: String,

        /// Friend's address
        #[arg(long)]
        to: String,

        /// Token amount, e.g. 20 or 12.5
        #[arg(long)]
        amount: String,
    },
}

#[derive(Subcommand, Debug)]
enum PriorityCmd {
    /// List funding sources in the order they are tried
    Show {
        #[arg(long)]
        account: String,
    },

    /// Move a source to the top ("SELF" or a sponsor address)
    Pin {
        #[arg(long)]
        account: String,

        source: FundingSource,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();
    let cli = Cli::parse();

    let cmd = match cli.cmd {
        Commands::Parse { text } => {
            let request =
                parse_payment_qr(&text).ok_or_else(|| anyhow!("not an AmiPay payment QR"))?;
            println!("{}", serde_json::to_string_pretty(&request)?);
            return Ok(());
        }
        other => other,
    };

    let cfg = AppConfig::load_from(&cli.config)?
        .resolved()
        .context("resolving configuration")?;
    tracing::info!(
        chain = %cfg.chain_name,
        chain_id = cfg.chain_id,
        rpc = %cfg.rpc.rpc_url,
        stablecoin = %cfg.contracts.stablecoin,
        settlement = %cfg.contracts.settlement,
        "config loaded"
    );
    let wallet = build_wallet(&cfg)?;

    match cmd {
        Commands::Parse { .. } => {}
        Commands::Balance { account } => {
            connect(&wallet, &account).await?;
            wallet.refresh_balance().await?;
            println!("{} USDC", wallet.display_balance());
        }
        Commands::Priority { cmd } => match cmd {
            PriorityCmd::Show { account } => {
                connect(&wallet, &account).await?;
                print_priority(&wallet).await?;
            }
            PriorityCmd::Pin { account, source } => {
                connect(&wallet, &account).await?;
                wallet
                    .load_priority_entries()
                    .await
                    .map_err(|e| anyhow!("{} ({})", e.user_message(), e))?;
                wallet.pin(source).context("saving payment priority")?;
                print_priority(&wallet).await?;
            }
        },
        Commands::Pay { account, qr } => {
            connect(&wallet, &account).await?;
            if wallet.handle_scan(&qr).is_none() {
                bail!("not an AmiPay payment QR");
            }
            let settled = wallet
                .pay_pending()
                .await
                .map_err(|e| anyhow!("{} ({})", e.user_message(), e))?;
            println!(
                "paid {} from {} in tx {} (block {})",
                settled.recipient, settled.source, settled.tx_hash, settled.block_number
            );
            println!("balance: {} USDC", wallet.display_balance());
        }
        Commands::Fund {
            account,
            to,
            amount,
        } => {
            connect(&wallet, &account).await?;
            let pending = wallet
                .give_a_hand(&to, &amount)
                .await
                .map_err(|e| anyhow!("{} ({})", e.user_message(), e))?;
            println!("approval {} confirmed, deposit {} submitted", pending.approval, pending.deposit);
            wallet
                .confirm_deposit(&pending)
                .await
                .map_err(|e| anyhow!("{} ({})", e.user_message(), e))?;
            println!("deposit confirmed; balance: {} USDC", wallet.display_balance());
        }
    }

    Ok(())
}

fn build_wallet(cfg: &ResolvedConfig) -> Result<WalletController> {
    let rpc = RpcClient::from_cfg(&cfg.rpc)?;
    let client: Arc<dyn ChainClient> = Arc::new(EvmChainClient::new(rpc, cfg.contracts));

    let prefs = cfg.prefs_path();
    let store = SledStore::open(&prefs)
        .with_context(|| format!("opening priority store at {}", prefs.display()))?;
    tracing::debug!(path = %prefs.display(), "priority store opened");

    Ok(WalletController::new(
        Some(client),
        PriorityBook::new(Arc::new(store)),
        WalletSettings::from_config(cfg),
    ))
}

async fn connect(wallet: &WalletController, account: &str) -> Result<Address> {
    let account = parse_address(account).with_context(|| format!("bad account {}", account))?;
    wallet.connect(account);
    wallet
        .load_token_info()
        .await
        .context("reading token decimals")?;
    Ok(account)
}

async fn print_priority(wallet: &WalletController) -> Result<()> {
    let entries = wallet
        .load_priority_entries()
        .await
        .map_err(|e| anyhow!("{} ({})", e.user_message(), e))?;
    for (i, entry) in entries.iter().enumerate() {
        if entry.subtitle.is_empty() {
            println!("{}. {} [{}]", i + 1, entry.label, entry.source);
        } else {
            println!("{}. {} [{}] {}", i + 1, entry.label, entry.source, entry.subtitle);
        }
    }
    Ok(())
}
