use intertechno_core::IntertechnoPacket;
use intertechno_link::{
    event_channel, CocLines, ConnectionState, InterfaceSettings, LineInterface, MemoryLine,
    RadioInterface, SerialSettings,
};
use std::sync::{Arc, Mutex};
use tokio::time::{timeout, Duration};

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn missing_serial_port_leaves_interface_disconnected() {
    let (events, _rx) = event_channel();
    let iface = LineInterface::cul(
        InterfaceSettings::new("cul0"),
        SerialSettings::cul("/dev/does-not-exist-intertechno"),
        events,
    );

    timeout(WAIT, iface.start_listening()).await.unwrap();
    assert_eq!(iface.state(), ConnectionState::Disconnected);
    assert!(!iface.is_open());

    timeout(WAIT, iface.send_packet(&IntertechnoPacket::new(1, "FF")))
        .await
        .unwrap();
    assert!(iface.last_packet_sent().is_none());
    timeout(WAIT, iface.stop_listening()).await.unwrap();
}

#[tokio::test]
async fn empty_device_path_is_not_opened() {
    let (events, _rx) = event_channel();
    let iface = LineInterface::cul(InterfaceSettings::new("cul0"), SerialSettings::cul(""), events);

    timeout(WAIT, iface.start_listening()).await.unwrap();
    assert_eq!(iface.state(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn coc_lines_untouched_when_port_fails_to_open() {
    let enable = Arc::new(Mutex::new(MemoryLine::new(false)));
    let (events, _rx) = event_channel();
    let iface = LineInterface::coc(
        InterfaceSettings::new("coc0"),
        SerialSettings::coc("/dev/does-not-exist-intertechno"),
        CocLines {
            reset: None,
            enable: Some(Box::new(enable.clone())),
        },
        events,
    );

    iface.start_listening().await;
    assert_eq!(iface.state(), ConnectionState::Disconnected);
    assert!(enable.lock().unwrap().history().is_empty());
}
