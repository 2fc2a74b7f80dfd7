use std::env;
use std::net::SocketAddr;

use contracts::ServiceConfig;
use ledger_api::{serve, LedgerApi};

fn print_usage() {
    println!("ledger-cli <command>");
    println!("commands:");
    println!("  serve [addr]");
    println!("    default addr: 127.0.0.1:8080");
    println!("  register <name> <url> <cpc_bid>");
    println!("  credit <shop_id> <amount>");
    println!("  show <shop_id>");
    println!("  search <query>");
    println!();
    println!("storage: VAI_SQLITE_PATH (default vai_ledger.sqlite)");
}

fn default_sqlite_path() -> String {
    env::var("VAI_SQLITE_PATH")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| "vai_ledger.sqlite".to_string())
}

fn parse_socket_addr(value: Option<&String>) -> Result<SocketAddr, String> {
    let raw = value.map(String::as_str).unwrap_or("127.0.0.1:8080");
    raw.parse::<SocketAddr>()
        .map_err(|_| format!("invalid addr: {raw}"))
}

fn parse_amount(value: Option<&String>, label: &str) -> Result<i64, String> {
    let raw = value.ok_or_else(|| format!("missing {label}"))?;
    raw.parse::<i64>()
        .map_err(|_| format!("invalid {label}: {raw}"))
}

fn open_api() -> Result<LedgerApi, String> {
    let path = default_sqlite_path();
    LedgerApi::with_sqlite(ServiceConfig::default(), &path)
        .map_err(|err| format!("failed to open ledger at {path}: {err}"))
}

fn run_register(args: &[String]) -> Result<(), String> {
    let name = args.get(2).cloned().ok_or_else(|| "missing name".to_string())?;
    let url = args.get(3).cloned().ok_or_else(|| "missing url".to_string())?;
    let cpc_bid = parse_amount(args.get(4), "cpc_bid")?;
    if cpc_bid <= 0 {
        return Err(format!("cpc_bid must be positive: {cpc_bid}"));
    }

    let api = open_api()?;
    let id = api
        .upsert_advertiser(None, name, url, cpc_bid)
        .map_err(|err| format!("registration failed: {err}"))?;
    println!("registered shop_id={id}");
    Ok(())
}

fn run_credit(args: &[String]) -> Result<(), String> {
    let shop_id = args
        .get(2)
        .cloned()
        .ok_or_else(|| "missing shop_id".to_string())?;
    let amount = parse_amount(args.get(3), "amount")?;
    if amount <= 0 {
        return Err(format!("amount must be positive: {amount}"));
    }

    let api = open_api()?;
    let credited = api
        .credit_balance(&shop_id, amount)
        .map_err(|err| format!("credit failed: {err}"))?;
    if !credited {
        return Err(format!("unknown shop_id: {shop_id}"));
    }

    let balance = api
        .advertiser(&shop_id)
        .map_err(|err| format!("lookup failed: {err}"))?
        .map(|advertiser| advertiser.ad_balance)
        .unwrap_or(0);
    println!("credited shop_id={shop_id} amount={amount} balance={balance}");
    Ok(())
}

fn run_show(args: &[String]) -> Result<(), String> {
    let shop_id = args
        .get(2)
        .cloned()
        .ok_or_else(|| "missing shop_id".to_string())?;

    let api = open_api()?;
    let advertiser = api
        .advertiser(&shop_id)
        .map_err(|err| format!("lookup failed: {err}"))?
        .ok_or_else(|| format!("unknown shop_id: {shop_id}"))?;

    println!(
        "shop_id={} name={} url={} cpc_bid={} balance={} eligible={}",
        advertiser.id,
        advertiser.name,
        advertiser.url,
        advertiser.cpc_bid,
        advertiser.ad_balance,
        advertiser.is_eligible(),
    );
    Ok(())
}

fn run_search(args: &[String]) -> Result<(), String> {
    let query = args
        .get(2)
        .cloned()
        .ok_or_else(|| "missing query".to_string())?;

    let mut api = open_api()?;
    let ranked = api
        .search(&query)
        .map_err(|err| format!("search failed: {err}"))?;

    if ranked.is_empty() {
        println!("no eligible placements for: {query}");
        return Ok(());
    }

    for (position, placement) in ranked.iter().enumerate() {
        println!(
            "{}. shop_id={} name={} score={:.4} cpc_bid={}",
            position + 1,
            placement.advertiser.id,
            placement.advertiser.name,
            placement.score,
            placement.advertiser.cpc_bid,
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = env::args().collect();
    let command = args.get(1).map(String::as_str);

    match command {
        Some("serve") => match parse_socket_addr(args.get(2)) {
            Ok(addr) => {
                println!("serving api on http://{addr}");
                let sqlite_path = Some(default_sqlite_path());
                if let Err(err) = serve(addr, ServiceConfig::default(), sqlite_path).await {
                    eprintln!("server error: {err}");
                    std::process::exit(1);
                }
            }
            Err(err) => {
                eprintln!("error: {err}");
                print_usage();
                std::process::exit(2);
            }
        },
        Some("register") => {
            if let Err(err) = run_register(&args) {
                eprintln!("error: {err}");
                print_usage();
                std::process::exit(2);
            }
        }
        Some("credit") => {
            if let Err(err) = run_credit(&args) {
                eprintln!("error: {err}");
                print_usage();
                std::process::exit(2);
            }
        }
        Some("show") => {
            if let Err(err) = run_show(&args) {
                eprintln!("error: {err}");
                print_usage();
                std::process::exit(2);
            }
        }
        Some("search") => {
            if let Err(err) = run_search(&args) {
                eprintln!("error: {err}");
                print_usage();
                std::process::exit(2);
            }
        }
        _ => {
            print_usage();
            std::process::exit(2);
        }
    }
}
