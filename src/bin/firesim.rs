use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use colored::*;
use firesim::protocol::{encode_line, StoreEvent, StoreRequest, StoreResponse};
use serde_json::{json, Map, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: &str = "8080";
const DEFAULT_ROOT: &str = "system";
const REQUEST_TIMEOUT_S: u64 = 5;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[tokio::main]
async fn main() -> CliResult<()> {
    let on_off = ["on", "off", "enable", "disable"];
    let matches = App::new("firesim")
        .version("0.1.0")
        .author("Fire Safety Systems Team")
        .about("🔥 Fire Suppression Simulator - Mobile-side control and inspection")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name("host")
                .short("H")
                .long("host")
                .value_name("HOST")
                .help("Simulator host address")
                .takes_value(true)
                .default_value(DEFAULT_HOST)
                .global(true),
        )
        .arg(
            Arg::with_name("port")
                .short("p")
                .long("port")
                .value_name("PORT")
                .help("Simulator port")
                .takes_value(true)
                .default_value(DEFAULT_PORT)
                .global(true),
        )
        .arg(
            Arg::with_name("root")
                .long("root")
                .value_name("PATH")
                .help("Store root the simulator publishes under")
                .takes_value(true)
                .default_value(DEFAULT_ROOT)
                .global(true),
        )
        .arg(
            Arg::with_name("format")
                .short("f")
                .long("format")
                .value_name("FORMAT")
                .help("Output format")
                .takes_value(true)
                .possible_values(&["json", "table", "compact"])
                .default_value("table")
                .global(true),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .help("Enable verbose output")
                .global(true),
        )
        .subcommand(
            SubCommand::with_name("status")
                .about("📊 Show current sensors, actuators and mode")
        )
        .subcommand(
            SubCommand::with_name("notifications")
                .about("🔔 List active notifications")
        )
        .subcommand(
            SubCommand::with_name("history")
                .about("📜 List retained history events")
        )
        .subcommand(
            SubCommand::with_name("test")
                .about("🧪 Request a manual self-test")
        )
        .subcommand(
            SubCommand::with_name("shutdown")
                .about("⏸️  Disable or re-enable the appliance")
                .arg(
                    Arg::with_name("state")
                        .help("Shutdown state")
                        .required(true)
                        .possible_values(&on_off),
                ),
        )
        .subcommand(
            SubCommand::with_name("override")
                .about("🔕 Silence or reactivate the alarm")
                .arg(
                    Arg::with_name("state")
                        .help("Alarm override state")
                        .required(true)
                        .possible_values(&on_off),
                ),
        )
        .subcommand(
            SubCommand::with_name("watch")
                .about("📈 Stream live snapshots")
        )
        .get_matches();

    let host = matches.value_of("host").unwrap_or(DEFAULT_HOST);
    let port = matches.value_of("port").unwrap_or(DEFAULT_PORT).parse::<u16>()?;
    let root = matches.value_of("root").unwrap_or(DEFAULT_ROOT).trim_matches('/').to_string();
    let format = matches.value_of("format").unwrap_or("table");
    let verbose = matches.is_present("verbose");
    let addr = format!("{}:{}", host, port);

    if verbose {
        println!("{}", "🔥 firesim".bright_red().bold());
        println!("{} {}", "Connecting to".dimmed(), addr);
    }

    match matches.subcommand() {
        ("status", _) => handle_status(&addr, &root, format).await?,
        ("notifications", _) => handle_notifications(&addr, &root, format).await?,
        ("history", _) => handle_history(&addr, &root, format).await?,
        ("test", _) => {
            let response = set_command(&addr, &root, "trigger_test", true).await?;
            print_command_result("Manual test", "REQUESTED", &response, format);
        }
        ("shutdown", Some(sub)) => handle_flag(sub, &addr, &root, format, "shutdown_system", "Shutdown").await?,
        ("override", Some(sub)) => handle_flag(sub, &addr, &root, format, "override_alarm", "Alarm override").await?,
        ("watch", _) => handle_watch(&addr, format).await?,
        _ => {
            println!("{}", "No command specified. Use --help for usage information.".yellow());
        }
    }

    Ok(())
}

fn normalize_state(state: &str) -> bool {
    matches!(state, "on" | "enable")
}

async fn handle_flag(
    matches: &ArgMatches<'_>,
    addr: &str,
    root: &str,
    format: &str,
    field: &str,
    label: &str,
) -> CliResult<()> {
    let state = normalize_state(matches.value_of("state").unwrap_or("off"));
    let response = set_command(addr, root, field, state).await?;
    print_command_result(label, if state { "ON" } else { "OFF" }, &response, format);
    Ok(())
}

async fn set_command(addr: &str, root: &str, field: &str, value: bool) -> CliResult<StoreResponse> {
    let mut fields = Map::new();
    fields.insert(field.to_string(), Value::Bool(value));
    send_request(
        addr,
        &StoreRequest::Update {
            path: format!("{}/commands", root),
            fields,
        },
    )
    .await
}

async fn get_path(addr: &str, path: String) -> CliResult<Option<Value>> {
    match send_request(addr, &StoreRequest::Get { path }).await? {
        StoreResponse::Ok { value } => Ok(value),
        StoreResponse::Error { message } => Err(message.into()),
        StoreResponse::Subscribed => Err("unexpected subscription acknowledgement".into()),
    }
}

async fn connect(addr: &str) -> CliResult<TcpStream> {
    match TcpStream::connect(addr).await {
        Ok(stream) => Ok(stream),
        Err(e) => {
            eprintln!("{} Failed to connect to simulator at {}", "❌".red(), addr.bright_white());
            if e.kind() == std::io::ErrorKind::ConnectionRefused {
                eprintln!("{} Server is not running. Start it with:", "💡".yellow());
                eprintln!("   {}", "cargo run --bin firesim-simulator".bright_cyan());
            } else {
                eprintln!("{} Network error: {}", "🔌".yellow(), e.to_string().bright_red());
            }
            Err(e.into())
        }
    }
}

async fn send_request(addr: &str, request: &StoreRequest) -> CliResult<StoreResponse> {
    let stream = connect(addr).await?;
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let line = encode_line(request)?;

    let exchange = async {
        writer.write_all(line.as_bytes()).await?;
        let mut response = String::new();
        if reader.read_line(&mut response).await? == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "Server closed connection",
            ));
        }
        Ok(response)
    };

    match tokio::time::timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_S), exchange).await {
        Ok(result) => Ok(serde_json::from_str(result?.trim())?),
        Err(_) => {
            eprintln!("{} Request timed out after {} seconds", "⏰".yellow(), REQUEST_TIMEOUT_S);
            Err("Request timeout".into())
        }
    }
}

fn print_command_result(action: &str, value: &str, response: &StoreResponse, format: &str) {
    match format {
        "json" => println!("{}", serde_json::to_string(response).unwrap_or_default()),
        "compact" => {
            if response.is_ok() {
                println!("{}", "OK".bright_green());
            } else {
                println!("{}", "ERROR".bright_red());
            }
        }
        _ => match response {
            StoreResponse::Error { message } => {
                println!("{} {} failed: {}", "❌".red(), action.bright_white(), message.bright_red());
            }
            _ => {
                println!("{} {} set to {}", "✅".green(), action.bright_white(), value.bright_cyan());
                println!("{} Takes effect on the next simulator tick", "💡".yellow());
            }
        },
    }
}

async fn handle_status(addr: &str, root: &str, format: &str) -> CliResult<()> {
    let Some(tree) = get_path(addr, root.to_string()).await? else {
        println!("{}", "Nothing published yet".yellow());
        return Ok(());
    };

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&tree)?),
        "compact" => println!("{}", compact_line(&tree)),
        _ => print_status_table(&tree),
    }
    Ok(())
}

fn mode_label(mode: &str) -> ColoredString {
    match mode {
        "normal" => mode.to_uppercase().bright_green(),
        "warning" => mode.to_uppercase().yellow(),
        "emergency" => mode.to_uppercase().bright_red().bold(),
        "test" => mode.to_uppercase().bright_cyan(),
        _ => mode.to_uppercase().dimmed(),
    }
}

fn on_off(active: bool) -> ColoredString {
    if active {
        "ON".bright_red()
    } else {
        "OFF".green()
    }
}

fn print_status_table(tree: &Value) {
    let sensors = &tree["sensors"];
    let actuators = &tree["actuators"];
    let status = &tree["status"];

    println!("{}", "📊 Appliance Status".bright_blue().bold());
    println!("{}", "════════════════════".bright_blue());
    println!(
        "{} {}",
        "Mode:".bright_white(),
        mode_label(status["mode"].as_str().unwrap_or("unknown"))
    );
    if status["emergency_override"].as_bool().unwrap_or(false) {
        println!("{} {}", "Override:".bright_white(), "ALARM SILENCED".yellow());
    }
    println!(
        "{} {} dBm",
        "WiFi:".bright_white(),
        status["connectivity"]["signal_strength_dbm"].as_i64().unwrap_or(0)
    );

    println!("\n{}", "🌡️  Sensors".bright_white().bold());
    println!(
        "  Temperature: {:>6.1} °C  [{}]",
        sensors["temperature"]["value"].as_f64().unwrap_or(0.0),
        sensors["temperature"]["status"].as_str().unwrap_or("?")
    );
    println!(
        "  CO level:    {:>6} ppm [{}]",
        sensors["co_level"]["ppm"].as_u64().unwrap_or(0),
        sensors["co_level"]["status"].as_str().unwrap_or("?")
    );
    println!(
        "  Flame:       {:>6}     [{}]{}",
        sensors["flame"]["intensity"].as_u64().unwrap_or(0),
        sensors["flame"]["status"].as_str().unwrap_or("?"),
        if sensors["flame"]["detected"].as_bool().unwrap_or(false) {
            " 🔥".to_string()
        } else {
            String::new()
        }
    );
    println!(
        "  Water flow:  {:>6.1} L/min, {:.1} L total [{}]",
        sensors["water_flow"]["rate_lpm"].as_f64().unwrap_or(0.0),
        sensors["water_flow"]["total_liters"].as_f64().unwrap_or(0.0),
        sensors["water_flow"]["status"].as_str().unwrap_or("?")
    );

    println!("\n{}", "⚙️  Actuators".bright_white().bold());
    println!(
        "  Alarm: {} ({}s)",
        on_off(actuators["alarm"]["active"].as_bool().unwrap_or(false)),
        actuators["alarm"]["duration_sec"].as_u64().unwrap_or(0)
    );
    println!(
        "  Pump:  {} ({}s)",
        on_off(actuators["pump"]["active"].as_bool().unwrap_or(false)),
        actuators["pump"]["runtime_sec"].as_u64().unwrap_or(0)
    );
}

fn compact_line(tree: &Value) -> String {
    format!(
        "[{}] {} | {:.1}°C | CO {}ppm | flame {} | alarm {} | pump {}",
        tree["status"]["last_update"].as_str().unwrap_or("-"),
        mode_label(tree["status"]["mode"].as_str().unwrap_or("unknown")),
        tree["sensors"]["temperature"]["value"].as_f64().unwrap_or(0.0),
        tree["sensors"]["co_level"]["ppm"].as_u64().unwrap_or(0),
        tree["sensors"]["flame"]["intensity"].as_u64().unwrap_or(0),
        on_off(tree["actuators"]["alarm"]["active"].as_bool().unwrap_or(false)),
        on_off(tree["actuators"]["pump"]["active"].as_bool().unwrap_or(false)),
    )
}

async fn handle_notifications(addr: &str, root: &str, format: &str) -> CliResult<()> {
    let payload = get_path(addr, format!("{}/notifications", root))
        .await?
        .unwrap_or_else(|| json!({"active": false, "queue": {}}));

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    let empty = Map::new();
    let queue = payload["queue"].as_object().unwrap_or(&empty);
    if queue.is_empty() {
        println!("{}", "No active notifications".dimmed());
        return Ok(());
    }

    for (id, notification) in queue {
        let priority = notification["priority"].as_str().unwrap_or("normal");
        let tag = match priority {
            "critical" => priority.to_uppercase().bright_red().bold(),
            "high" => priority.to_uppercase().red(),
            "low" => priority.to_uppercase().dimmed(),
            _ => priority.to_uppercase().white(),
        };
        if format == "compact" {
            println!("{} {} {}", tag, notification["type"].as_str().unwrap_or("?"), id);
        } else {
            println!(
                "{} {} {}",
                tag,
                notification["title"].as_str().unwrap_or("").bright_white().bold(),
                id.dimmed()
            );
            println!("    {}", notification["message"].as_str().unwrap_or(""));
        }
    }
    Ok(())
}

async fn handle_history(addr: &str, root: &str, format: &str) -> CliResult<()> {
    let entries = get_path(addr, format!("{}/history", root))
        .await?
        .unwrap_or_else(|| json!([]));

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    let list = entries.as_array().map(Vec::as_slice).unwrap_or(&[]);
    if list.is_empty() {
        println!("{}", "No history events retained".dimmed());
        return Ok(());
    }

    for entry in list {
        println!(
            "{} {}",
            entry["timestamp"].as_str().unwrap_or("-").dimmed(),
            entry["event_type"].as_str().unwrap_or("?").bright_cyan()
        );
    }
    Ok(())
}

async fn handle_watch(addr: &str, format: &str) -> CliResult<()> {
    println!("{}", "📡 Watching simulator snapshots (Press Ctrl+C to stop)...".bright_blue().bold());

    let stream = connect(addr).await?;
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    writer.write_all(encode_line(&StoreRequest::Subscribe)?.as_bytes()).await?;

    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            break;
        }
        let trimmed = line.trim();
        if let Ok(event) = serde_json::from_str::<StoreEvent>(trimmed) {
            match format {
                "json" => println!("{}", serde_json::to_string(&event.value)?),
                _ => println!("{}", compact_line(&event.value)),
            }
        }
    }
    Ok(())
}
