use clap::Parser;
use intertechno_core::{Frame, Framer, StackPrefix};
use std::io::BufRead;

#[derive(Parser, Debug)]
#[command(name = "it-decode")]
struct Args {
    /// Lines to classify. Reads stdin when empty.
    lines: Vec<String>,
    /// 1-based daisy-chain position of the receiving dongle.
    #[arg(long, default_value_t = 1)]
    stack_position: u8,
    /// Print decoded packets as JSON.
    #[arg(long)]
    json: bool,
}

fn report(framer: &Framer, line: &str, json: bool) -> Result<(), serde_json::Error> {
    match framer.classify(line) {
        Frame::Packet(packet) if json => println!("{}", serde_json::to_string(&packet)?),
        Frame::Packet(packet) => println!(
            "{}: address={} payload={} rssi={}",
            packet.protocol(),
            packet.sender_address(),
            packet.payload(),
            packet.rssi()
        ),
        Frame::DutyCycleLimit => println!("duty-cycle limit"),
        Frame::Unrecognized(text) => println!("unrecognized: {text}"),
        Frame::Malformed { protocol, error } => println!("malformed {protocol}: {error}"),
        Frame::Ignored => {}
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();
    let framer = Framer::new(StackPrefix::for_position(args.stack_position));

    if args.lines.is_empty() {
        for line in std::io::stdin().lock().lines() {
            report(&framer, &line?, args.json)?;
        }
    } else {
        for line in &args.lines {
            report(&framer, line, args.json)?;
        }
    }
    Ok(())
}
