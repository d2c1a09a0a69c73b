//! Client/server round trips over a real socket.

use std::time::Duration;

use prost::Message;
use prost_reflect::{DynamicMessage, Value};

use prpc::client::{CallOptions, Client, ClientError, ClientOptions};
use prpc::format::Format;
use prpc::server::CallContext;
use prpc::status::{Code, GENERIC_ERROR_MESSAGE};

mod common;
use common::{ErrorInfo, HelloReply, HelloRequest, SERVICE};

fn client(addr: std::net::SocketAddr) -> Client {
    Client::with_options(addr.to_string(), ClientOptions::default().descriptor_pool(common::pool()))
}

fn request(name: &str) -> HelloRequest {
    HelloRequest {
        name: name.to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_call_in_every_format() {
    let (addr, shutdown) = common::spawn(common::greeter().build()).await;
    let client = client(addr);

    for format in Format::PREFERENCE {
        let opts = CallOptions::default().format(format);
        let reply: HelloReply = client
            .call(&CallContext::new(), SERVICE, "SayHello", &request("Ada"), &opts)
            .await
            .unwrap();
        assert_eq!(reply.message, "Hello, Ada", "{format}");
    }

    let _ = shutdown.send(());
}

#[tokio::test]
async fn test_status_with_details_in_every_format() {
    let (addr, shutdown) = common::spawn(common::greeter().build()).await;
    let client = client(addr);

    for format in Format::PREFERENCE {
        let opts = CallOptions::default().format(format);
        let err = client
            .call::<_, HelloReply>(&CallContext::new(), SERVICE, "Fail", &request("not_found"), &opts)
            .await
            .unwrap_err();

        let status = err.status().expect("server sent a status");
        assert_eq!(status.code(), Code::NotFound, "{format}");
        assert_eq!(status.message(), "build 42 not found");
        assert_eq!(status.details().len(), 2);

        let info = ErrorInfo::decode(status.details()[0].value.as_slice()).unwrap();
        assert_eq!(info.domain, "builds.example.com");
        let mask = prost_types::FieldMask::decode(status.details()[1].value.as_slice()).unwrap();
        assert_eq!(mask.paths, vec!["builds.id"]);
    }

    let _ = shutdown.send(());
}

#[tokio::test]
async fn test_detail_type_missing_from_client_pool_keeps_status() {
    let (addr, shutdown) = common::spawn(common::greeter().build()).await;
    let client = Client::new(addr.to_string());

    for format in Format::PREFERENCE {
        let opts = CallOptions::default().format(format);
        let err = client
            .call::<_, HelloReply>(&CallContext::new(), SERVICE, "Fail", &request("not_found"), &opts)
            .await
            .unwrap_err();

        let status = err.status().expect("server sent a status");
        assert_eq!(status.code(), Code::NotFound, "{format}");
        assert_eq!(status.message(), "build 42 not found");
        let mask = status.details().last().expect("field mask detail decodes");
        assert_eq!(prost_types::FieldMask::decode(mask.value.as_slice()).unwrap().paths, vec!["builds.id"]);
    }

    let err = client
        .call::<_, HelloReply>(
            &CallContext::new(),
            SERVICE,
            "Fail",
            &request("not_found"),
            &CallOptions::default().format(Format::JsonPb),
        )
        .await
        .unwrap_err();
    assert_eq!(err.status().unwrap().details().len(), 1);

    let _ = shutdown.send(());
}

#[tokio::test]
async fn test_internal_message_is_masked() {
    let (addr, shutdown) = common::spawn(common::greeter().build()).await;

    let err = client(addr)
        .call::<_, HelloReply>(&CallContext::new(), SERVICE, "Fail", &request("internal"), &CallOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::Internal);
    assert_eq!(err.status().unwrap().message(), GENERIC_ERROR_MESSAGE);

    let _ = shutdown.send(());
}

#[tokio::test]
async fn test_deadline_is_sent_and_enforced() {
    let (addr, shutdown) = common::spawn(common::greeter().build()).await;

    let slow = HelloRequest {
        count: 2_000,
        ..Default::default()
    };
    let opts = CallOptions::default().timeout(Duration::from_millis(50));
    let err = client(addr)
        .call::<_, HelloReply>(&CallContext::new(), SERVICE, "Slow", &slow, &opts)
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::DeadlineExceeded);

    let _ = shutdown.send(());
}

#[tokio::test]
async fn test_unrepresentable_timeout_calls_without_deadline() {
    let (addr, shutdown) = common::spawn(common::greeter().build()).await;

    let ctx = CallContext::new().with_timeout(Duration::MAX);
    assert!(ctx.deadline().is_none());
    let opts = CallOptions::default().timeout(Duration::MAX);
    let reply: HelloReply = client(addr)
        .call(&ctx, SERVICE, "SayHello", &request("Ada"), &opts)
        .await
        .unwrap();
    assert_eq!(reply.message, "Hello, Ada");

    let _ = shutdown.send(());
}

#[tokio::test]
async fn test_expired_context_fails_before_sending() {
    let client = Client::new("127.0.0.1:1");
    let ctx = CallContext::new().with_timeout(Duration::ZERO);
    let err = client
        .call::<_, HelloReply>(&ctx, SERVICE, "SayHello", &request("x"), &CallOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::DeadlineExceeded);
}

#[tokio::test]
async fn test_metadata_round_trip() {
    let (addr, shutdown) = common::spawn(common::greeter().build()).await;

    let ctx = CallContext::new()
        .with_metadata("x-echo", "from-context")
        .with_metadata("x-echo", vec![0u8, 1, 255]);
    let opts = CallOptions::default().metadata("x-echo", "from-options");
    let reply: HelloReply = client(addr)
        .call(&ctx, SERVICE, "SayHello", &request("x"), &opts)
        .await
        .unwrap();

    assert_eq!(reply.values[0], "from-options");
    assert!(reply.values.contains(&"[0, 1, 255]".to_string()));
    assert!(reply.values.contains(&format!("host={addr}")));

    let _ = shutdown.send(());
}

#[tokio::test]
async fn test_response_metadata() {
    let (addr, shutdown) = common::spawn(common::greeter().build()).await;

    let mut reply = HelloReply::default();
    let metadata = client(addr)
        .call_into(&CallContext::new(), SERVICE, "SayHello", &request("x"), &mut reply, &CallOptions::default())
        .await
        .unwrap();
    assert!(metadata.contains_key("x-request-id"));
    assert!(!metadata.contains_key("x-prpc-grpc-code"));

    let _ = shutdown.send(());
}

#[tokio::test]
async fn test_dynamic_messages() {
    let (addr, shutdown) = common::spawn(common::greeter().build()).await;

    let mut req = DynamicMessage::new(common::message_descriptor("prpc.test.HelloRequest"));
    req.set_field_by_name("name", Value::String("Dyn".to_string()));
    let mut reply = DynamicMessage::new(common::message_descriptor("prpc.test.HelloReply"));

    let opts = CallOptions::default().format(Format::JsonPb);
    client(addr)
        .call_into(&CallContext::new(), SERVICE, "SayHello", &req, &mut reply, &opts)
        .await
        .unwrap();
    assert_eq!(
        reply.get_field_by_name("message").unwrap().as_str(),
        Some("Hello, Dyn")
    );

    let _ = shutdown.send(());
}

#[tokio::test]
async fn test_unknown_method_is_unimplemented() {
    let (addr, shutdown) = common::spawn(common::greeter().build()).await;

    let err = client(addr)
        .call::<_, HelloReply>(&CallContext::new(), SERVICE, "Missing", &request("x"), &CallOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::Unimplemented);

    let _ = shutdown.send(());
}

#[tokio::test]
async fn test_connection_refused_is_transport_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = client(addr)
        .call::<_, HelloReply>(&CallContext::new(), SERVICE, "SayHello", &request("x"), &CallOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Transport(_)));
    assert_eq!(err.code(), Code::Unavailable);
    assert!(err.status().is_none());
}
