use std::env;
use std::fs;
use std::sync::Arc;

use chrono::Utc;
use clap::{Parser, Subcommand};
use invoicedb::engine::LocalStore;
use invoicedb::model::{invoice_total, Customer, Invoice, InvoiceItem, InvoiceStatus, UserRole};
use invoicedb::Database;
use uuid::Uuid;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory holding the collection files. Falls back to
    /// INVOICEDB_DATA_DIR, then "data".
    #[arg(short, long)]
    data_dir: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Clone)]
enum Commands {
    /// Create any missing collections.
    Init,
    /// Create a user keyed by email.
    CreateUser {
        email: String,
        password: String,
        #[arg(long, default_value = "team")]
        role: String,
    },
    /// Check a password against the stored one.
    VerifyPassword { email: String, password: String },
    /// Add a customer. The id is generated here, not by the store.
    AddCustomer {
        name: String,
        phone: String,
        address: String,
        city: String,
    },
    ListCustomers,
    /// Draft an invoice from a JSON file of line items, computing the total.
    AddInvoice {
        customer_id: String,
        items_file: String,
        #[arg(long, default_value_t = 10.0)]
        fees_percent: f64,
        #[arg(long, default_value_t = 0.0)]
        transport: f64,
    },
    ListInvoices,
    /// Write the whole database as one JSON document.
    Export {
        #[arg(short, long)]
        out: Option<String>,
    },
    /// Overwrite the whole database from a JSON document.
    Import { file: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let data_dir = cli
        .data_dir
        .or_else(|| env::var("INVOICEDB_DATA_DIR").ok())
        .unwrap_or_else(|| "data".to_string());

    let store = Arc::new(LocalStore::open(&data_dir)?);
    let db = Database::new(store);

    match cli.command {
        Commands::Init => {
            db.initialize().await?;
            println!("OK");
        }
        Commands::CreateUser { email, password, role } => {
            let role = match role.as_str() {
                "admin" => UserRole::Admin,
                "team" => UserRole::Team,
                other => anyhow::bail!("unknown role: {} (expected admin or team)", other),
            };
            db.create_user(&email, &password, role).await?;
            println!("OK");
        }
        Commands::VerifyPassword { email, password } => {
            println!("{}", db.verify_password(&email, &password).await?);
        }
        Commands::AddCustomer { name, phone, address, city } => {
            let mut customers = db.customers().await?;
            customers.push(Customer {
                id: Uuid::new_v4().to_string(),
                name,
                phone,
                address,
                city,
            });
            db.replace_customers(&customers).await?;
            println!("OK");
        }
        Commands::ListCustomers => {
            let customers = db.customers().await?;
            println!("{}", serde_json::to_string_pretty(&customers)?);
        }
        Commands::AddInvoice { customer_id, items_file, fees_percent, transport } => {
            let items: Vec<InvoiceItem> = serde_json::from_str(&fs::read_to_string(&items_file)?)?;
            let mut invoices = db.invoices().await?;
            let invoice = Invoice {
                id: invoice_number(),
                customer_id,
                total: invoice_total(&items, fees_percent, transport),
                created_at: Utc::now(),
                status: InvoiceStatus::Draft,
            };
            let id = invoice.id.clone();
            invoices.push(invoice);
            db.replace_invoices(&invoices).await?;
            println!("{}", id);
        }
        Commands::ListInvoices => {
            let invoices = db.invoices().await?;
            println!("{}", serde_json::to_string_pretty(&invoices)?);
        }
        Commands::Export { out } => {
            let blob = db.export_data().await?;
            match out {
                Some(path) => {
                    fs::write(&path, blob)?;
                    println!("exported to {}", path);
                }
                None => println!("{}", blob),
            }
        }
        Commands::Import { file } => {
            let blob = fs::read_to_string(&file)?;
            db.import_data(&blob).await?;
            println!("OK");
        }
    }

    Ok(())
}

/// Invoice numbers follow the date-plus-suffix shape the paper invoices use,
/// e.g. `20240517-042`.
fn invoice_number() -> String {
    let suffix = Uuid::new_v4().as_u128() % 1000;
    format!("{}-{:03}", Utc::now().format("%Y%m%d"), suffix)
}
