//! Integration tests for the WebSocket transport.
//!
//! A real listener on an OS-assigned port, driven by a
//! `tokio-tungstenite` client. The test plays the relay's part by
//! polling events and answering admission requests.

#[cfg(feature = "websocket")]
mod websocket {
    use std::time::Duration;

    use futures_util::{SinkExt, StreamExt};
    use hostrelay_transport::{
        Connection, DeliveryMethod, DisconnectReason, Transport, TransportEvent,
        WebSocketConfig, WebSocketConnection, WebSocketTransport,
    };
    use tokio_tungstenite::tungstenite::Message;

    type ClientWs = tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >;

    async fn bind() -> WebSocketTransport {
        WebSocketTransport::bind("127.0.0.1:0", WebSocketConfig::default())
            .await
            .expect("should bind")
    }

    async fn connect(transport: &WebSocketTransport, token: &str) -> ClientWs {
        let url = format!("ws://{}", transport.local_addr());
        let (mut ws, _) = tokio_tungstenite::connect_async(&url)
            .await
            .expect("client should connect");
        ws.send(Message::text(token.to_string())).await.expect("send token");
        ws
    }

    /// Polls until an event matching `pick` shows up.
    async fn next_event<T>(
        transport: &mut WebSocketTransport,
        mut pick: impl FnMut(TransportEvent<WebSocketConnection>) -> Option<T>,
    ) -> T {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            for event in transport.poll_events() {
                if let Some(found) = pick(event) {
                    return found;
                }
            }
            assert!(tokio::time::Instant::now() < deadline, "timed out waiting for event");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    async fn admit(transport: &mut WebSocketTransport) -> WebSocketConnection {
        let request = next_event(transport, |e| match e {
            TransportEvent::ConnectionRequest(r) => Some(r),
            _ => None,
        })
        .await;
        request.accept();
        next_event(transport, |e| match e {
            TransportEvent::Connected(c) => Some(c),
            _ => None,
        })
        .await
    }

    #[tokio::test]
    async fn test_admission_request_carries_token() {
        let mut transport = bind().await;
        let _client = connect(&transport, "secret").await;

        let request = next_event(&mut transport, |e| match e {
            TransportEvent::ConnectionRequest(r) => Some(r),
            _ => None,
        })
        .await;
        assert_eq!(request.token(), "secret");
        request.reject();
    }

    #[tokio::test]
    async fn test_rejected_client_is_closed() {
        let mut transport = bind().await;
        let mut client = connect(&transport, "wrong").await;

        let request = next_event(&mut transport, |e| match e {
            TransportEvent::ConnectionRequest(r) => Some(r),
            _ => None,
        })
        .await;
        request.reject();

        let result = tokio::time::timeout(Duration::from_secs(2), client.next()).await;
        match result {
            Ok(Some(Ok(Message::Close(_)))) | Ok(None) | Ok(Some(Err(_))) => {}
            other => panic!("expected close, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_frames_flow_both_ways() {
        let mut transport = bind().await;
        let mut client = connect(&transport, "ok").await;
        let conn = admit(&mut transport).await;
        assert!(conn.is_connected());

        client
            .send(Message::Binary(vec![3, 1, 2].into()))
            .await
            .expect("client send");
        let (id, data) = next_event(&mut transport, |e| match e {
            TransportEvent::Received { id, data, .. } => Some((id, data)),
            _ => None,
        })
        .await;
        assert_eq!(id, conn.id());
        assert_eq!(data, vec![3, 1, 2]);

        conn.send(&[14, 9], DeliveryMethod::Unreliable).expect("server send");
        loop {
            let msg = client.next().await.expect("frame").expect("ok");
            if let Message::Binary(data) = msg {
                assert_eq!(data.to_vec(), vec![14, 9]);
                break;
            }
        }
    }

    #[tokio::test]
    async fn test_remote_close_produces_disconnected() {
        let mut transport = bind().await;
        let mut client = connect(&transport, "ok").await;
        let conn = admit(&mut transport).await;

        client.close(None).await.expect("close");

        let (id, reason) = next_event(&mut transport, |e| match e {
            TransportEvent::Disconnected { id, reason } => Some((id, reason)),
            _ => None,
        })
        .await;
        assert_eq!(id, conn.id());
        assert_eq!(reason, DisconnectReason::RemoteClose);
        assert!(!conn.is_connected());
    }

    #[tokio::test]
    async fn test_local_disconnect_flushes_then_closes() {
        let mut transport = bind().await;
        let mut client = connect(&transport, "ok").await;
        let conn = admit(&mut transport).await;

        conn.send(&[16, 1], DeliveryMethod::ReliableOrdered).expect("send");
        conn.disconnect();

        let mut got_frame = false;
        while let Some(Ok(msg)) = client.next().await {
            match msg {
                Message::Binary(data) => {
                    assert_eq!(data.to_vec(), vec![16, 1]);
                    got_frame = true;
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
        assert!(got_frame, "queued frame should be flushed before close");

        let reason = next_event(&mut transport, |e| match e {
            TransportEvent::Disconnected { reason, .. } => Some(reason),
            _ => None,
        })
        .await;
        assert_eq!(reason, DisconnectReason::LocalClose);
    }

    #[tokio::test]
    async fn test_poll_returns_at_most_the_configured_batch() {
        let config = WebSocketConfig {
            max_events_per_poll: 2,
            ..WebSocketConfig::default()
        };
        let mut transport = WebSocketTransport::bind("127.0.0.1:0", config)
            .await
            .expect("should bind");
        let mut client = connect(&transport, "ok").await;
        let _conn = admit(&mut transport).await;

        for n in 0..5u8 {
            client
                .send(Message::Binary(vec![3, n].into()))
                .await
                .expect("client send");
        }

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        let mut frames = Vec::new();
        while frames.len() < 5 {
            let batch = transport.poll_events();
            assert!(batch.len() <= 2, "batch of {} events", batch.len());
            for event in batch {
                if let TransportEvent::Received { data, .. } = event {
                    frames.push(data);
                }
            }
            assert!(tokio::time::Instant::now() < deadline, "timed out waiting for frames");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let expected: Vec<Vec<u8>> = (0..5u8).map(|n| vec![3, n]).collect();
        assert_eq!(frames, expected);
    }

    #[tokio::test]
    async fn test_shutdown_sends_close_to_peers() {
        let mut transport = bind().await;
        let mut client = connect(&transport, "ok").await;
        let conn = admit(&mut transport).await;

        conn.send(&[16, 2], DeliveryMethod::ReliableOrdered).expect("send");
        transport.shutdown();

        let closed = async {
            let mut got_frame = false;
            while let Some(Ok(msg)) = client.next().await {
                match msg {
                    Message::Binary(data) => {
                        assert_eq!(data.to_vec(), vec![16, 2]);
                        got_frame = true;
                    }
                    Message::Close(_) => return got_frame,
                    _ => {}
                }
            }
            panic!("socket ended without a Close frame");
        };
        let got_frame = tokio::time::timeout(Duration::from_secs(2), closed)
            .await
            .expect("timed out waiting for close");
        assert!(got_frame, "queued frame should be flushed before close");
        assert!(!conn.is_connected());
    }
}
