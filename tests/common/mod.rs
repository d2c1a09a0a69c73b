//! Shared fixtures for integration tests: a test proto package, a greeter
//! service and helpers to run it on a real socket.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::LazyLock;
use std::time::Duration;

use prost_reflect::{DescriptorPool, MessageDescriptor, ReflectMessage};
use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{
    DescriptorProto, FieldDescriptorProto, FieldMask, FileDescriptorProto, MethodDescriptorProto,
    ServiceDescriptorProto,
};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use prpc::server::{CallContext, Server, ServerBuilder};
use prpc::status::Status;

pub const SERVICE: &str = "prpc.test.Greeter";

#[derive(Clone, PartialEq, prost::Message)]
pub struct HelloRequest {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(message, optional, tag = "2")]
    pub fields: Option<FieldMask>,
    #[prost(int32, tag = "3")]
    pub count: i32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct HelloReply {
    #[prost(string, tag = "1")]
    pub message: String,
    #[prost(string, repeated, tag = "2")]
    pub values: Vec<String>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ErrorInfo {
    #[prost(string, tag = "1")]
    pub reason: String,
    #[prost(string, tag = "2")]
    pub domain: String,
}

impl prost::Name for ErrorInfo {
    const NAME: &'static str = "ErrorInfo";
    const PACKAGE: &'static str = "prpc.test";

    fn type_url() -> String {
        "type.googleapis.com/prpc.test.ErrorInfo".to_string()
    }
}

macro_rules! reflect {
    ($ty:ident, $name:literal) => {
        impl ReflectMessage for $ty {
            fn descriptor(&self) -> MessageDescriptor {
                message_descriptor($name)
            }
        }
    };
}

reflect!(HelloRequest, "prpc.test.HelloRequest");
reflect!(HelloReply, "prpc.test.HelloReply");
reflect!(ErrorInfo, "prpc.test.ErrorInfo");

/// Well-known types plus the `prpc.test` package.
pub static POOL: LazyLock<DescriptorPool> = LazyLock::new(|| {
    let mut pool = FieldMask::default().descriptor().parent_pool().clone();
    pool.add_file_descriptor_proto(test_file())
        .expect("test descriptors are valid");
    pool
});

pub fn pool() -> DescriptorPool {
    POOL.clone()
}

pub fn message_descriptor(name: &str) -> MessageDescriptor {
    POOL.get_message_by_name(name)
        .unwrap_or_else(|| panic!("{name} missing from test pool"))
}

fn field(name: &str, json_name: &str, number: i32, ty: Type, label: Label, type_name: Option<&str>) -> FieldDescriptorProto {
    FieldDescriptorProto {
        name: Some(name.to_string()),
        json_name: Some(json_name.to_string()),
        number: Some(number),
        label: Some(label as i32),
        r#type: Some(ty as i32),
        type_name: type_name.map(str::to_string),
        ..Default::default()
    }
}

fn message(name: &str, fields: Vec<FieldDescriptorProto>) -> DescriptorProto {
    DescriptorProto {
        name: Some(name.to_string()),
        field: fields,
        ..Default::default()
    }
}

fn test_file() -> FileDescriptorProto {
    FileDescriptorProto {
        name: Some("prpc/test/greeter.proto".to_string()),
        package: Some("prpc.test".to_string()),
        dependency: vec!["google/protobuf/field_mask.proto".to_string()],
        syntax: Some("proto3".to_string()),
        message_type: vec![
            message(
                "HelloRequest",
                vec![
                    field("name", "name", 1, Type::String, Label::Optional, None),
                    field("fields", "fields", 2, Type::Message, Label::Optional, Some(".google.protobuf.FieldMask")),
                    field("count", "count", 3, Type::Int32, Label::Optional, None),
                ],
            ),
            message(
                "HelloReply",
                vec![
                    field("message", "message", 1, Type::String, Label::Optional, None),
                    field("values", "values", 2, Type::String, Label::Repeated, None),
                ],
            ),
            message(
                "ErrorInfo",
                vec![
                    field("reason", "reason", 1, Type::String, Label::Optional, None),
                    field("domain", "domain", 2, Type::String, Label::Optional, None),
                ],
            ),
        ],
        service: vec![ServiceDescriptorProto {
            name: Some("Greeter".to_string()),
            method: ["SayHello", "Fail", "Panic", "Slow"]
                .into_iter()
                .map(|name| MethodDescriptorProto {
                    name: Some(name.to_string()),
                    input_type: Some(".prpc.test.HelloRequest".to_string()),
                    output_type: Some(".prpc.test.HelloReply".to_string()),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }],
        ..Default::default()
    }
}

/// Greets `name`, echoing `x-echo` and `x-echo-bin` metadata.
async fn say_hello(ctx: CallContext, req: HelloRequest) -> Result<HelloReply, Status> {
    let mut values: Vec<String> = ctx
        .metadata()
        .get_all("x-echo")
        .iter()
        .map(|v| String::from_utf8_lossy(v).into_owned())
        .collect();
    values.extend(ctx.metadata().get_all("x-echo-bin").iter().map(|v| format!("{:?}", v.as_ref())));
    if let Some(host) = ctx.host() {
        values.push(format!("host={host}"));
    }
    Ok(HelloReply {
        message: format!("Hello, {}", req.name),
        values,
    })
}

/// Fails with the status named by `req.name`.
async fn fail(_ctx: CallContext, req: HelloRequest) -> Result<HelloReply, Status> {
    let info = ErrorInfo {
        reason: "BUILD_MISSING".to_string(),
        domain: "builds.example.com".to_string(),
    };
    Err(match req.name.as_str() {
        "not_found" => Status::not_found("build 42 not found")
            .with_detail(&info)
            .with_detail(&FieldMask { paths: vec!["builds.id".to_string()] }),
        "invalid" => Status::invalid_argument("name is required"),
        _ => Status::internal("connection to db-3.internal refused"),
    })
}

async fn panic_handler(_ctx: CallContext, _req: HelloRequest) -> Result<HelloReply, Status> {
    panic!("handler bug")
}

/// Sleeps for `req.count` milliseconds.
async fn slow(_ctx: CallContext, req: HelloRequest) -> Result<HelloReply, Status> {
    tokio::time::sleep(Duration::from_millis(req.count as u64)).await;
    Ok(HelloReply {
        message: "done".to_string(),
        values: Vec::new(),
    })
}

/// Greeter methods registered on a fresh builder.
pub fn greeter() -> ServerBuilder {
    Server::builder()
        .with_descriptor_pool(pool())
        .register(SERVICE, "SayHello", say_hello)
        .register(SERVICE, "Fail", fail)
        .register(SERVICE, "Panic", panic_handler)
        .register(SERVICE, "Slow", slow)
}

/// Serves `server` on an ephemeral port until the returned sender fires.
pub async fn spawn(server: Server) -> (SocketAddr, oneshot::Sender<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        server
            .serve_with_shutdown(listener, async {
                let _ = rx.await;
            })
            .await
            .unwrap();
    });
    (addr, tx)
}
