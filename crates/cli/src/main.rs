//! Game Shop CLI - browse the catalog, manage the cart, and check out.
//!
//! # Usage
//!
//! ```bash
//! # Browse the catalog
//! gs-cli products list --search zelda
//! gs-cli products show 12
//!
//! # Manage the cart (persisted in GAMESHOP_DATA_DIR)
//! gs-cli cart add 12
//! gs-cli cart set 12 3
//! gs-cli cart show
//!
//! # Log in, check out with a completed payment capture, review orders
//! gs-cli login -u player
//! gs-cli checkout --name "Jo Player" --email jo@example.com --reference CAPTURE-123
//! gs-cli orders list
//!
//! # Finish an order whose payment needed provider approval
//! gs-cli orders complete ORD-1001
//! ```
//!
//! # Commands
//!
//! - `products` - Catalog listing and product details
//! - `cart` - Cart inspection and editing
//! - `login` / `logout` - Account session
//! - `checkout` - Run the checkout flow for the current cart
//! - `orders` - Order history
//!
//! Set `GAMESHOP_LOG_FORMAT=json` for JSON logs on stderr.

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};
use gameshop_core::{CategoryId, OrderId, ProductId};
use gameshop_storefront::config::{LogFormat, StorefrontConfig};
use gameshop_storefront::error::StorefrontError;
use gameshop_storefront::state::AppState;
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "gs-cli")]
#[command(author, version, about = "Game Shop storefront CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Browse the catalog
    Products {
        #[command(subcommand)]
        action: ProductAction,
    },
    /// Inspect and edit the cart
    Cart {
        #[command(subcommand)]
        action: CartAction,
    },
    /// Log in with username and password
    Login {
        /// Account username
        #[arg(short, long)]
        username: String,

        /// Account password
        #[arg(short, long, env = "GAMESHOP_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Log out; the cart is kept as the guest cart
    Logout,
    /// Check out the current cart
    Checkout(commands::checkout::CheckoutArgs),
    /// Order history (requires login)
    Orders {
        #[command(subcommand)]
        action: OrderAction,
    },
}

#[derive(Subcommand)]
enum ProductAction {
    /// List catalog products
    List {
        /// Page number
        #[arg(short, long)]
        page: Option<u32>,

        /// Search text
        #[arg(short, long)]
        search: Option<String>,

        /// Category id
        #[arg(short, long)]
        category: Option<CategoryId>,
    },
    /// Show a product and related products
    Show {
        /// Product id
        id: ProductId,
    },
}

#[derive(Subcommand)]
enum CartAction {
    /// Show cart contents and totals
    Show,
    /// Add one unit of a product
    Add {
        /// Product id
        id: ProductId,
    },
    /// Remove a product
    Remove {
        /// Product id
        id: ProductId,
    },
    /// Set a product's quantity (1-99)
    Set {
        /// Product id
        id: ProductId,
        /// New quantity
        quantity: i64,
    },
    /// Empty the cart
    Clear,
}

#[derive(Subcommand)]
enum OrderAction {
    /// List past orders
    List,
    /// Show one order
    Show {
        /// Order id
        id: OrderId,
    },
    /// Finish an order after approving its payment at the provider
    Complete {
        /// Order reference printed by `checkout` (e.g. ORD-1001)
        order_id: String,
    },
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &StorefrontConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main]
#[allow(clippy::print_stderr)]
async fn main() {
    let cli = Cli::parse();

    let config = match StorefrontConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(2);
        }
    };

    // Sentry must be initialized before the tracing subscriber
    let _sentry_guard = init_sentry(&config);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "gameshop_storefront=info,gs_cli=info".into());

    // Logs go to stderr so command output stays pipeable; JSON when asked for
    let json_logs = config.log_format == LogFormat::Json;
    let json_layer = json_logs.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_writer(std::io::stderr)
    });
    let text_layer =
        (!json_logs).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    if let Err(e) = run(cli, config).await {
        e.report();
        eprintln!("{}", e.user_message());
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: StorefrontConfig) -> Result<(), StorefrontError> {
    let mut state = AppState::init(config)?;

    match cli.command {
        Commands::Products { action } => match action {
            ProductAction::List {
                page,
                search,
                category,
            } => commands::catalog::list(&state, page, search, category).await?,
            ProductAction::Show { id } => commands::catalog::show(&state, id).await?,
        },
        Commands::Cart { action } => match action {
            CartAction::Show => commands::cart::show(&state),
            CartAction::Add { id } => commands::cart::add(&mut state, id).await?,
            CartAction::Remove { id } => commands::cart::remove(&mut state, id),
            CartAction::Set { id, quantity } => commands::cart::set(&mut state, id, quantity)?,
            CartAction::Clear => commands::cart::clear(&mut state),
        },
        Commands::Login { username, password } => {
            commands::account::login(&mut state, &username, password).await?;
        }
        Commands::Logout => commands::account::logout(&mut state),
        Commands::Checkout(args) => commands::checkout::run(&mut state, args).await?,
        Commands::Orders { action } => match action {
            OrderAction::List => commands::account::orders(&mut state).await?,
            OrderAction::Show { id } => commands::account::order(&mut state, id).await?,
            OrderAction::Complete { order_id } => {
                commands::account::complete(&mut state, &order_id).await?;
            }
        },
    }
    Ok(())
}
