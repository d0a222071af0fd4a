//! InfluxDB sink against an in-process HTTP stub.

use std::collections::BTreeMap;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_test::{assert_err, assert_ok};

use sensorlink_bridge_framework::sinks::{InfluxPublisher, InfluxSinkConfig};
use sensorlink_bridge_framework::{DeliveryError, Publisher, Sample, TransportState};

#[derive(Debug)]
struct Request {
    target: String,
    headers: Vec<(String, String)>,
    body: String,
}

impl Request {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

async fn start_influx(status: u16, body: &'static str) -> (String, mpsc::UnboundedReceiver<Request>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(serve(stream, status, body, tx.clone()));
        }
    });

    (url, rx)
}

async fn serve(
    stream: TcpStream,
    status: u16,
    body: &'static str,
    tx: mpsc::UnboundedSender<Request>,
) {
    let mut reader = BufReader::new(stream);
    loop {
        let mut request_line = String::new();
        if reader.read_line(&mut request_line).await.unwrap_or(0) == 0 {
            return;
        }
        let target = request_line
            .split_whitespace()
            .nth(1)
            .unwrap_or_default()
            .to_string();

        let mut headers = Vec::new();
        loop {
            let mut line = String::new();
            if reader.read_line(&mut line).await.unwrap_or(0) == 0 {
                return;
            }
            let line = line.trim_end();
            if line.is_empty() {
                break;
            }
            if let Some((name, value)) = line.split_once(':') {
                headers.push((name.trim().to_string(), value.trim().to_string()));
            }
        }

        let length = headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
            .and_then(|(_, v)| v.parse::<usize>().ok())
            .unwrap_or(0);
        let mut payload = vec![0u8; length];
        if reader.read_exact(&mut payload).await.is_err() {
            return;
        }

        let _ = tx.send(Request {
            target,
            headers,
            body: String::from_utf8_lossy(&payload).to_string(),
        });

        let response = format!(
            "HTTP/1.1 {} Stub\r\ncontent-length: {}\r\n\r\n{}",
            status,
            body.len(),
            body
        );
        if reader.get_mut().write_all(response.as_bytes()).await.is_err() {
            return;
        }
    }
}

fn config(url: String) -> InfluxSinkConfig {
    InfluxSinkConfig {
        url,
        org: "lab".to_string(),
        token: Some("secret".to_string()),
        tags: BTreeMap::from([("Yocto".to_string(), "Yocto1".to_string())]),
        ..InfluxSinkConfig::default()
    }
}

fn sample() -> Sample {
    Sample::with_timestamp(
        1_700_000_000_000,
        "YCO2MK02-11E865",
        "ppm",
        [("co2", 412.3), ("humidity", 44.1), ("pressure", 1013.2)],
    )
    .unwrap()
}

#[tokio::test]
async fn test_point_is_written_to_bucket() {
    let (url, mut requests) = start_influx(204, "").await;
    let mut sink = InfluxPublisher::new(config(url)).unwrap();

    assert_ok!(sink.deliver(&sample()).await);
    assert_eq!(sink.transport_state(), TransportState::Connected);

    let request = tokio::time::timeout(Duration::from_secs(5), requests.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        request.target,
        "/api/v2/write?org=lab&bucket=CO2bucket&precision=ns"
    );
    assert_eq!(request.header("authorization"), Some("Token secret"));
    assert_eq!(
        request.body,
        "Yoctopuce,Yocto=Yocto1,source=YCO2MK02-11E865,unit=ppm \
         co2=412.3,humidity=44.1,pressure=1013.2 1700000000000000000"
    );

    sink.close().await;
    assert_eq!(sink.transport_state(), TransportState::Disconnected);
}

#[tokio::test]
async fn test_client_error_is_a_rejection() {
    let (url, _requests) =
        start_influx(400, r#"{"code":"invalid","message":"unable to parse"}"#).await;
    let mut sink = InfluxPublisher::new(config(url)).unwrap();

    let err = sink.deliver(&sample()).await.unwrap_err();
    match err {
        DeliveryError::Rejected(detail) => assert!(detail.contains("unable to parse"), "{}", detail),
        other => panic!("expected rejection, got {:?}", other),
    }
    assert_eq!(sink.transport_state(), TransportState::Connected);
}

#[tokio::test]
async fn test_server_error_marks_sink_failed() {
    let (url, _requests) = start_influx(503, "").await;
    let mut sink = InfluxPublisher::new(config(url)).unwrap();

    let err = assert_err!(sink.deliver(&sample()).await);
    assert!(matches!(err, DeliveryError::Unreachable(_)));
    assert_eq!(sink.transport_state(), TransportState::Failed);
}

#[tokio::test]
async fn test_unreachable_server() {
    let url = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        format!("http://{}", listener.local_addr().unwrap())
    };
    let mut sink = InfluxPublisher::new(config(url)).unwrap();

    let err = sink.deliver(&sample()).await.unwrap_err();
    assert!(matches!(err, DeliveryError::Unreachable(_)));
    assert_eq!(sink.transport_state(), TransportState::Failed);
}
