use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use signaldesk_client::api::{DEFAULT_ASSET, Signal, SignalRequest, SignalStatus, Timeframe};
use signaldesk_client::entitlement::{MONTHLY_PACKAGE, PurchaseOutcome};
use signaldesk_client::signal::DEFAULT_SIGNAL_LIMIT;
use signaldesk_client::session::RegisterForm;
use signaldesk_client::{AppContext, Config};
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// SignalDesk account, subscription and signal tool
#[derive(Parser)]
#[command(name = "signaldesk", version, about)]
struct Cli {
    /// Backend API base URL
    #[arg(long, env = "SIGNALDESK_API_URL")]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sign in and remember the session
    Login {
        email: String,
        #[arg(long, env = "SIGNALDESK_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Create an account
    Register {
        name: String,
        email: String,
        #[arg(long, env = "SIGNALDESK_PASSWORD", hide_env_values = true)]
        password: String,
        /// Repeat the password
        #[arg(long)]
        confirm: Option<String>,
        /// Agree to the Terms of Service
        #[arg(long)]
        accept_terms: bool,
    },
    /// Forget the stored session
    Logout,
    /// Show the signed-in user, refreshed from the backend
    Whoami,
    /// Show subscription status and access
    Status,
    /// List purchasable packages
    Offerings,
    /// Buy a package
    Purchase {
        #[arg(default_value = MONTHLY_PACKAGE)]
        package: String,
    },
    /// Restore earlier purchases
    Restore,
    /// Cancel the subscription
    Cancel,
    /// Generate a trading signal (premium)
    Generate {
        #[arg(default_value = DEFAULT_ASSET)]
        asset: String,
        /// Scalp, Intraday or Swing
        #[arg(long, default_value = "Intraday")]
        timeframe: Timeframe,
    },
    /// List recent signals
    Signals {
        #[arg(long, default_value_t = DEFAULT_SIGNAL_LIMIT)]
        limit: u32,
    },
    /// Show one signal
    Signal { id: String },
    /// Record the outcome of a signal (active, hit_tp, stopped_out, expired)
    SetStatus { id: String, status: SignalStatus },
    /// Show performance statistics
    Performance,
    /// Show the dashboard overview
    Dashboard,
    /// List tradable assets
    Assets,
    /// Check that the backend is up
    Health,
}

fn print_signal(signal: &Signal) {
    let targets: Vec<String> = signal.take_profit.iter().map(|tp| tp.to_string()).collect();
    println!(
        "{} {} {} @ {} tp [{}] sl {} ({}%, {}, {})",
        signal.id,
        signal.signal,
        signal.asset,
        signal.entry,
        targets.join(", "),
        signal
            .stop_loss
            .map(|sl| sl.to_string())
            .unwrap_or_else(|| "-".to_string()),
        signal.confidence,
        signal.timeframe,
        signal.status
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "signaldesk=info,signaldesk_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env();
    if let Some(url) = cli.api_url {
        config.api_url = url;
    }
    debug!("Loaded configuration: api_url={}", config.api_url);

    let app = AppContext::new(&config).context("failed to create backend client")?;
    // Commands run one-shot, so no background watcher: fetch explicitly
    let phase = app.session.restore().await;
    debug!("Session restored: {:?}", phase);

    match cli.command {
        Command::Login { email, password } => {
            let user = app.session.login(&email, &password).await?;
            println!("Signed in as {} <{}>", user.name, user.email);
        }
        Command::Register {
            name,
            email,
            password,
            confirm,
            accept_terms,
        } => {
            let mut form = RegisterForm::new(name, email, password);
            form.confirm_password = confirm;
            form.accepted_terms = accept_terms;
            let user = app.session.register_form(&form).await?;
            println!("Welcome, {}! Account created for {}", user.name, user.email);
        }
        Command::Logout => {
            app.session.logout().await;
            println!("Signed out");
        }
        Command::Whoami => {
            if !app.session.is_authenticated().await {
                bail!("Not signed in");
            }
            let user = app.session.refresh_profile().await?;
            println!("{} <{}> (id {})", user.name, user.email, user.id);
        }
        Command::Status => {
            if app.session.is_authenticated().await {
                let entitlement = app.entitlements.fetch_status().await?;
                let expires = entitlement
                    .expires_at
                    .map(|t| t.format("%Y-%m-%d").to_string())
                    .unwrap_or_else(|| "never".to_string());
                println!(
                    "Plan: {} (active: {}, expires: {}{})",
                    entitlement.plan,
                    entitlement.is_active,
                    expires,
                    if entitlement.is_fallback() { ", offline placeholder" } else { "" }
                );
            }
            println!("Access: {:?}", app.access().await);
        }
        Command::Offerings => {
            for offering in app.entitlements.offerings() {
                println!("{}: {}", offering.identifier, offering.description);
                for package in &offering.packages {
                    println!(
                        "  {:<10} {} - {} ({})",
                        package.identifier,
                        package.title,
                        package.price_string(),
                        package.description
                    );
                }
            }
        }
        Command::Purchase { package } => {
            // Best effort: the short-circuit needs the current status
            if let Err(e) = app.entitlements.fetch_status().await {
                debug!("Status fetch before purchase failed: {}", e);
            }
            match app.entitlements.purchase(&package).await? {
                PurchaseOutcome::AlreadyEntitled => println!("Already subscribed"),
                PurchaseOutcome::Purchased(entitlement) => {
                    println!("Subscribed to {}", entitlement.plan)
                }
            }
        }
        Command::Restore => {
            let entitlement = app.entitlements.restore(None).await?;
            println!("Restored {} (active: {})", entitlement.plan, entitlement.is_active);
        }
        Command::Cancel => {
            app.entitlements.cancel().await?;
            println!("Subscription cancelled");
        }
        Command::Generate { asset, timeframe } => {
            // The gate needs the current status
            if app.session.is_authenticated().await
                && let Err(e) = app.entitlements.fetch_status().await
            {
                debug!("Status fetch before generating failed: {}", e);
            }
            let signal = app
                .signals
                .generate(&SignalRequest { asset, timeframe })
                .await?;
            print_signal(&signal);
            if !signal.ai_reasoning.is_empty() {
                println!("  {}", signal.ai_reasoning);
            }
        }
        Command::Signals { limit } => {
            for signal in app.signals.list(limit).await? {
                print_signal(&signal);
            }
        }
        Command::Signal { id } => print_signal(&app.signals.get(&id).await?),
        Command::SetStatus { id, status } => {
            let stored = app.signals.update_status(&id, status).await?;
            println!("Signal {} is now {}", id, stored);
        }
        Command::Performance => {
            let stats = app.signals.performance().await?;
            println!(
                "Signals: {} (active {}, hit TP {}, stopped out {})",
                stats.total_signals, stats.active_signals, stats.hit_tp, stats.stopped_out
            );
            println!(
                "Win rate: {:.1}%  Avg confidence: {:.1}",
                stats.win_rate, stats.avg_confidence
            );
        }
        Command::Dashboard => {
            let dashboard = app.signals.dashboard().await?;
            println!(
                "Subscription: {} (active: {})",
                dashboard.subscription.plan, dashboard.subscription.is_active
            );
            println!(
                "Active signals: {} of {}  AI confidence: {:.1}",
                dashboard.active_signals, dashboard.total_signals, dashboard.ai_confidence
            );
            for signal in &dashboard.recent_signals {
                print_signal(signal);
            }
        }
        Command::Assets => {
            let catalog = app.signals.assets().await?;
            for asset in &catalog.assets {
                println!("{:<8} {:<12} {}", asset.symbol, asset.name, asset.category);
            }
            println!("Timeframes: {}", catalog.timeframes.join(", "));
        }
        Command::Health => {
            let health = app.signals.health().await?;
            println!("{} {}: {}", health.service, health.version, health.status);
        }
    }

    Ok(())
}
