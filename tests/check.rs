use socketpeek::check::{check_port, validate_port, CloseReason, PortStatus};
use socketpeek::output::render_check;
use socketpeek::Error;
use std::net::TcpListener;
use std::time::Duration;

#[test]
fn listening_port_is_open() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let status = check_port("localhost", port, Duration::from_secs(2)).unwrap();
    // localhost may resolve to ::1 first on some hosts
    if status != PortStatus::Open {
        let status = check_port("127.0.0.1", port, Duration::from_secs(2)).unwrap();
        assert_eq!(status, PortStatus::Open);
    }
}

#[test]
fn unresolvable_host_is_closed() {
    let status = check_port("example.invalid", 443, Duration::from_secs(1)).unwrap();
    assert_eq!(status, PortStatus::Closed(CloseReason::Unresolvable));
    assert!(render_check("example.invalid", 443, &status).ends_with("Could not resolve hostname"));
}

#[test]
fn port_validation() {
    assert_eq!(validate_port("8080").unwrap(), 8080);
    assert!(matches!(validate_port("65536"), Err(Error::InvalidPort(_))));
    assert!(matches!(validate_port("-1"), Err(Error::InvalidPort(_))));
    assert!(matches!(validate_port("eighty"), Err(Error::InvalidPort(_))));
}

#[test]
fn status_serializes() {
    let json = serde_json::to_string(&PortStatus::Closed(CloseReason::Refused)).unwrap();
    assert_eq!(json, r#"{"closed":"refused"}"#);
    assert_eq!(serde_json::to_string(&PortStatus::Open).unwrap(), r#""open""#);
}
