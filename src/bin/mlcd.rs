use color_eyre::eyre::Result;
use magic_led_controller::*;
use std::{env, io};
use tracing_subscriber::EnvFilter;

/// Parses the `R,G,B` argument of `set_color`
fn parse_color(args: &str) -> Option<(u8, u8, u8)> {
    let rgb: Vec<u8> = args
        .split(',')
        .map(|s| s.trim().parse().ok())
        .collect::<Option<_>>()?;
    match rgb.as_slice() {
        [r, g, b] => Some((*r, *g, *b)),
        _ => None,
    }
}

/// Parses the `NAME[,speed[,brightness]]` argument of `set_effect`
fn parse_effect(args: &str) -> std::result::Result<Operation, String> {
    let mut parts = args.split(',').map(str::trim);
    let name = parts
        .next()
        .filter(|s| !s.is_empty())
        .ok_or("no effect given")?;
    let id = effects::lookup(name).map_err(|e| e.to_string())?;
    let mut number = |default: u32| -> std::result::Result<u32, String> {
        match parts.next() {
            Some(v) => v.parse().map_err(|_| format!("invalid number '{v}'")),
            None => Ok(default),
        }
    };
    let speed = number(50)?;
    let brightness = number(100)?;
    Ok(Operation::effect(id, speed, brightness))
}

/// Maps one input line to the operation it requests
fn parse_line(line: &str) -> std::result::Result<Operation, String> {
    let (cmd, args) = match line.split_once(':') {
        Some((cmd, args)) => (cmd, args),
        None => (line, ""),
    };
    match cmd {
        "power_on" => Ok(Operation::Power { on: true }),
        "power_off" => Ok(Operation::Power { on: false }),
        "set_color" => parse_color(args)
            .map(|(r, g, b)| Operation::rgb(r, g, b))
            .ok_or_else(|| {
                "Invalid color format. Use R,G,B (e.g., 255,0,0 for red)".to_string()
            }),
        "set_effect" => parse_effect(args),
        "sync_time" => Ok(Operation::time_sync_now()),
        "" => Err("No command given".to_string()),
        other => Err(format!("Unknown command: {other}")),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("RUST_LOG")
                .unwrap_or_else(|_| EnvFilter::new("magic_led_controller=warn")),
        )
        .with_writer(io::stderr)
        .compact()
        .init();
    color_eyre::install()?;

    // Get a target id/mac address from command line arguments.
    // If not provided, exit.
    let usage = "Usage: mlcd <id/mac address>";
    let args: Vec<_> = env::args().collect();
    if args.len() < 2 {
        eprintln!("{usage}");
        std::process::exit(1);
    }
    if args[1] == "-h" || args[1] == "--help" {
        eprintln!("{usage}");
        std::process::exit(0);
    }

    let selector = DeviceSelector {
        id: Some(args[1].clone()),
        name: None,
    };
    let transport = BleTransport::connect(&selector).await?;
    let mut controller = Controller::new(transport);

    // Inform about successful initialization
    println!("OK");

    // Mainloop: one command per line until stdin closes
    let mut input = String::new();
    loop {
        input.clear();
        if io::stdin().read_line(&mut input)? == 0 {
            break;
        }

        let op = match parse_line(input.trim()) {
            Ok(op) => op,
            Err(msg) => {
                eprintln!("ERR {msg}");
                continue;
            }
        };

        // A failed write leaves the device state unknown; stop here.
        controller.execute(&op).await?;
        println!("OK");
    }

    controller.transport().disconnect().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_line() {
        assert_eq!(parse_line("power_on"), Ok(Operation::Power { on: true }));
        assert_eq!(parse_line("power_off"), Ok(Operation::Power { on: false }));
        assert_eq!(
            parse_line("set_color:255, 0,10"),
            Ok(Operation::rgb(255, 0, 10))
        );
        assert_eq!(
            parse_line("set_effect:jump7,20"),
            Ok(Operation::effect(0x38, 20, 100))
        );
        assert!(matches!(parse_line("sync_time"), Ok(Operation::TimeSync(_))));
    }

    #[test]
    fn test_parse_line_errors() {
        assert!(parse_line("").is_err());
        assert!(parse_line("dance").is_err());
        assert!(parse_line("set_color:255,0").is_err());
        assert!(parse_line("set_color:256,0,0").is_err());
        assert!(parse_line("set_effect:").is_err());
        assert!(parse_line("set_effect:disco").is_err());
        assert!(parse_line("set_effect:fade7,fast").is_err());
    }
}
