use clap::Parser;
use intertechno_core::IntertechnoPacket;
use intertechno_link::{event_channel, RadioInterface};
use intertechno_tools::InterfaceArgs;

#[derive(Parser, Debug)]
#[command(name = "it-send")]
struct Args {
    #[command(flatten)]
    iface: InterfaceArgs,
    /// Sender address of the remote being emulated.
    #[arg(long)]
    address: u32,
    /// Command bits, e.g. `01` for on.
    #[arg(long)]
    payload: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();
    let (events, _rx) = event_channel();
    let iface = args.iface.build(events)?;
    let packet = IntertechnoPacket::new(args.address, args.payload);

    iface.start_listening().await;
    if !iface.is_open() {
        iface.stop_listening().await;
        return Err(format!("{} could not be opened", iface.id()).into());
    }
    iface.send_packet(&packet).await;
    let sent = iface.last_packet_sent().is_some();
    iface.stop_listening().await;

    if !sent {
        return Err("packet was not sent".into());
    }
    println!(
        "sent {}",
        packet.wire_form_for(args.iface.dialect.into_dialect())
    );
    Ok(())
}
