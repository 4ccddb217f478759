use clap::Parser;
use intertechno_link::{event_channel, InterfaceEvent, RadioInterface};
use intertechno_tools::InterfaceArgs;

#[derive(Parser, Debug)]
#[command(name = "it-listen")]
struct Args {
    #[command(flatten)]
    iface: InterfaceArgs,
    /// Print events as JSON lines.
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();
    let (events, mut rx) = event_channel();
    let iface = args.iface.build(events)?;

    iface.start_listening().await;
    println!("Listening on {} (Ctrl+C to stop)...", iface.id());
    while let Some(event) = rx.recv().await {
        if args.json {
            println!("{}", serde_json::to_string(&event)?);
            continue;
        }
        match event {
            InterfaceEvent::Packet {
                interface_id,
                packet,
            } => println!(
                "{interface_id}: {} from {} payload={} rssi={}",
                packet.protocol(),
                packet.sender_address(),
                packet.payload(),
                packet.rssi()
            ),
            InterfaceEvent::DutyCycleLimit { interface_id } => {
                println!("{interface_id}: duty-cycle limit reached")
            }
            InterfaceEvent::RadioFrame {
                interface_id,
                frame,
            } => println!("{interface_id}: frame {frame:02x?}"),
        }
    }
    Ok(())
}
