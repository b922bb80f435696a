//! End-to-end tests over loopback UDP
//!
//! Every server binds port 0 and is driven through `RadiusClient`, so each
//! exchange exercises the full encode, sign, verify and decode path on both
//! sides:
//! - PAP, CHAP and MS-CHAPv2 authentication with reply attributes
//! - Accounting acknowledged only after the record is stored
//! - Unknown clients dropped, surfacing as client timeouts
//! - Realm proxying through a second server and back

use radius_proto::attributes::microsoft;
use radius_proto::chap::ChapResponse;
use radius_proto::mppe::decrypt_salted;
use radius_proto::mschap::generate_authenticator_response;
use radius_proto::{Attribute, AttributeCode, AttributeValue, Code, MppeKeys, MsChapV2Response, Packet};
use radius_server::{
    AccountingSink, Client, ClientConfig, ClientError, Config, Endpoint, FileAccountingSink, LocalHandler,
    ProxyConfig, RadiusClient, RadiusServer, RealmConfig, ShutdownHandle, User,
};
use std::collections::HashMap;
use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tempfile::{NamedTempFile, TempDir};

const SECRET: &str = "testing123";

fn user(username: &str, password: &str) -> User {
    User {
        username: username.to_string(),
        password: password.to_string(),
        attributes: HashMap::new(),
    }
}

fn base_config(client_network: &str) -> Config {
    let mut alice = user("alice", "password");
    alice.attributes.insert("Session-Timeout".to_string(), "3600".to_string());
    alice.attributes.insert("Service-Type".to_string(), "Administrative-User".to_string());

    Config {
        listen_address: "127.0.0.1".to_string(),
        auth_port: 0,
        acct_port: Some(0),
        clients: vec![Client {
            address: client_network.to_string(),
            secret: SECRET.to_string(),
            name: Some("loopback".to_string()),
            enabled: true,
        }],
        users: vec![alice, user("bob", "hunter2")],
        ..Config::default()
    }
}

struct TestServer {
    server: Arc<RadiusServer>,
    auth: SocketAddr,
    acct: SocketAddr,
    shutdown: ShutdownHandle,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.shutdown();
    }
}

async fn start_server(config: &Config, sink: Option<Arc<dyn AccountingSink>>) -> TestServer {
    let dictionary = Arc::new(config.load_dictionary().expect("Failed to load dictionary"));
    let mut handler = LocalHandler::from_config(config, &dictionary).expect("Failed to build handler");
    if let Some(sink) = sink {
        handler.set_accounting_sink(sink);
    }

    let server = RadiusServer::bind(
        config.server_config().expect("Invalid server config"),
        dictionary,
        Arc::new(handler),
    )
    .await
    .expect("Failed to bind server");
    let server = Arc::new(server);

    let auth = server.auth_addr().unwrap();
    let acct = server.acct_addr().unwrap().unwrap();
    let shutdown = server.shutdown_handle();

    let running = Arc::clone(&server);
    tokio::spawn(async move {
        running.run().await.ok();
    });

    TestServer {
        server,
        auth,
        acct,
        shutdown,
    }
}

async fn client_for(server: &TestServer, retry_count: u32) -> RadiusClient {
    let mut config = ClientConfig::new(Endpoint::new(server.auth, SECRET))
        .with_accounting(Endpoint::new(server.acct, SECRET));
    config.bind_address = "127.0.0.1:0".parse().unwrap();
    config.socket_timeout = Duration::from_millis(500);
    config.retry_count = retry_count;

    let dictionary = Arc::new(radius_proto::Dictionary::standard().unwrap());
    RadiusClient::new(config, dictionary).await.expect("Failed to create client")
}

fn pap_request(client: &RadiusClient, username: &str, password: &str) -> Packet {
    let mut request = client.new_request(Code::AccessRequest);
    request.add_text("User-Name", username).unwrap();
    request.add_text("NAS-IP-Address", "127.0.0.1").unwrap();
    request.user_password = Some(password.to_string());
    request
}

#[tokio::test]
async fn test_pap_accept_with_reply_attributes() {
    let server = start_server(&base_config("127.0.0.1"), None).await;
    let client = client_for(&server, 2).await;

    let mut request = pap_request(&client, "alice", "password");
    let response = client.authenticate(&mut request).await.unwrap();

    assert_eq!(response.code, Code::AccessAccept);
    assert_eq!(response.identifier, request.identifier);
    assert_eq!(response.integer(AttributeCode::SessionTimeout), Some(3600));
    assert_eq!(response.integer(AttributeCode::ServiceType), Some(6));
}

#[tokio::test]
async fn test_pap_reject() {
    let server = start_server(&base_config("127.0.0.0/8"), None).await;
    let client = client_for(&server, 2).await;

    let mut request = pap_request(&client, "alice", "not-the-password");
    let response = client.authenticate(&mut request).await.unwrap();
    assert_eq!(response.code, Code::AccessReject);
    assert!(response.integer(AttributeCode::SessionTimeout).is_none());

    let mut request = pap_request(&client, "nobody", "password");
    let response = client.authenticate(&mut request).await.unwrap();
    assert_eq!(response.code, Code::AccessReject);
}

#[tokio::test]
async fn test_pap_under_mismatched_secret_rejected() {
    let server = start_server(&base_config("127.0.0.1"), None).await;
    let dictionary = Arc::new(radius_proto::Dictionary::standard().unwrap());
    let socket = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();

    // Secrets whose revealed password is neither the right one nor valid UTF-8
    for (identifier, nas_secret) in [b"nas-secret".as_slice(), b"letmein", b"radius", b"s3cr3t", b"x"]
        .into_iter()
        .enumerate()
    {
        let mut request = Packet::new(&dictionary, Code::AccessRequest, identifier as u8 + 1);
        request.add_text("User-Name", "alice").unwrap();
        request.user_password = Some("password".to_string());
        let data = request.encode_request(nas_secret).unwrap();

        socket.send_to(&data, server.auth).await.unwrap();
        let mut buf = [0u8; 4096];
        let (len, _) = tokio::time::timeout(Duration::from_secs(2), socket.recv_from(&mut buf))
            .await
            .expect("Request was dropped instead of rejected")
            .unwrap();

        let response =
            Packet::decode_response(&buf[..len], SECRET.as_bytes(), &request.authenticator, &dictionary).unwrap();
        assert_eq!(response.code, Code::AccessReject);
        assert_eq!(response.identifier, request.identifier);
    }
}

#[tokio::test]
async fn test_chap_with_authenticator_challenge() {
    let server = start_server(&base_config("127.0.0.1"), None).await;
    let client = client_for(&server, 2).await;

    // The request authenticator is only chosen at encode time, so carry an
    // explicit CHAP-Challenge.
    let challenge = [0x24u8; 16];
    let mut request = client.new_request(Code::AccessRequest);
    request.add_text("User-Name", "bob").unwrap();
    request.add_attribute(Attribute::new(AttributeCode::ChapChallenge.as_u8(), challenge.to_vec()).unwrap());
    request.add_attribute(
        Attribute::new(
            AttributeCode::ChapPassword.as_u8(),
            ChapResponse::generate(1, "hunter2", &challenge).to_bytes(),
        )
        .unwrap(),
    );

    let response = client.authenticate(&mut request).await.unwrap();
    assert_eq!(response.code, Code::AccessAccept);
}

#[tokio::test]
async fn test_mschap_v2_mutual_authentication() {
    let server = start_server(&base_config("127.0.0.1"), None).await;
    let client = client_for(&server, 2).await;

    let challenge = [0x5Au8; 16];
    let ms_response = MsChapV2Response::generate(7, "alice", "password", &challenge).unwrap();

    let mut request = client.new_request(Code::AccessRequest);
    request.add_text("User-Name", "alice").unwrap();
    request.add_attribute(
        Attribute::vendor(microsoft::VENDOR_ID, microsoft::MS_CHAP_CHALLENGE, challenge.to_vec()).unwrap(),
    );
    request.add_attribute(
        Attribute::vendor(
            microsoft::VENDOR_ID,
            microsoft::MS_CHAP2_RESPONSE,
            ms_response.to_bytes().to_vec(),
        )
        .unwrap(),
    );

    let response = client.authenticate(&mut request).await.unwrap();
    assert_eq!(response.code, Code::AccessAccept);

    let success = response
        .find_vendor_attribute(microsoft::VENDOR_ID, microsoft::MS_CHAP2_SUCCESS)
        .expect("MS-CHAP2-Success missing");
    let expected = generate_authenticator_response(
        "password",
        &ms_response.nt_response,
        &ms_response.peer_challenge,
        &challenge,
        "alice",
    );
    assert_eq!(success.value[0], 7);
    assert_eq!(String::from_utf8_lossy(&success.value[1..]), expected);

    let keys = MppeKeys::derive("password", &ms_response.nt_response, 16).unwrap();
    let recv_key = response
        .find_vendor_attribute(microsoft::VENDOR_ID, microsoft::MS_MPPE_RECV_KEY)
        .expect("MS-MPPE-Recv-Key missing");
    assert_eq!(
        decrypt_salted(&recv_key.value, SECRET.as_bytes(), &request.authenticator).unwrap(),
        keys.recv_key
    );
    assert_eq!(
        response.value_by_name("MS-MPPE-Encryption-Policy"),
        Some(AttributeValue::Integer(1))
    );
}

#[tokio::test]
async fn test_accounting_written_then_acknowledged() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("acct").join("accounting.log");
    let sink = Arc::new(FileAccountingSink::new(&path).await.unwrap());

    let server = start_server(&base_config("127.0.0.1"), Some(sink)).await;
    let client = client_for(&server, 2).await;

    let mut request = client.new_request(Code::AccountingRequest);
    request.add_text("Acct-Status-Type", "Stop").unwrap();
    request.add_text("Acct-Session-Id", "session-42").unwrap();
    request.add_text("User-Name", "alice").unwrap();
    request.add_text("Acct-Input-Octets", "10").unwrap();
    request.add_text("Acct-Input-Gigawords", "1").unwrap();
    request.add_text("Acct-Terminate-Cause", "User-Request").unwrap();

    // The client verifies the response authenticator against the MD5
    // request authenticator it computed.
    let response = client.account(&mut request).await.unwrap();
    assert_eq!(response.code, Code::AccountingResponse);

    let contents = std::fs::read_to_string(&path).unwrap();
    let record: serde_json::Value = serde_json::from_str(contents.trim()).unwrap();
    assert_eq!(record["event"], "stop");
    assert_eq!(record["session_id"], "session-42");
    assert_eq!(record["input_octets"], (1u64 << 32) + 10);
    assert_eq!(record["terminate_cause"], "User-Request");
}

#[tokio::test]
async fn test_accounting_without_sink_not_acknowledged() {
    let server = start_server(&base_config("127.0.0.1"), None).await;
    let client = client_for(&server, 1).await;

    let mut request = client.new_request(Code::AccountingRequest);
    request.add_text("Acct-Status-Type", "Start").unwrap();
    assert!(matches!(
        client.account(&mut request).await,
        Err(ClientError::Timeout { attempts: 1 })
    ));
}

#[tokio::test]
async fn test_unknown_client_dropped() {
    let server = start_server(&base_config("10.0.0.0/8"), None).await;
    let client = client_for(&server, 2).await;

    let mut request = pap_request(&client, "alice", "password");
    match client.authenticate(&mut request).await {
        Err(ClientError::Timeout { attempts }) => assert_eq!(attempts, 2),
        other => panic!("Expected timeout, got {:?}", other.map(|p| p.code)),
    }
}

#[tokio::test]
async fn test_status_server() {
    let server = start_server(&base_config("127.0.0.1"), None).await;
    let client = client_for(&server, 2).await;

    let mut request = client.new_request(Code::StatusServer);
    let response = client.authenticate(&mut request).await.unwrap();
    assert_eq!(response.code, Code::AccessAccept);
}

#[tokio::test]
async fn test_custom_dictionary_reply_attribute() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "VENDOR 9 Cisco").unwrap();
    writeln!(file, "VENDORATTR 9 Cisco-AVPair 1 string").unwrap();

    let mut config = base_config("127.0.0.1");
    config.dictionary_path = Some(file.path().to_string_lossy().into_owned());
    config.users[1]
        .attributes
        .insert("Cisco-AVPair".to_string(), "shell:priv-lvl=15".to_string());

    let server = start_server(&config, None).await;
    let client = client_for(&server, 2).await;

    let mut request = pap_request(&client, "bob", "hunter2");
    let response = client.authenticate(&mut request).await.unwrap();
    assert_eq!(response.code, Code::AccessAccept);

    let avpair = response.find_vendor_attribute(9, 1).expect("Cisco-AVPair missing");
    assert_eq!(avpair.as_string().unwrap(), "shell:priv-lvl=15");
}

#[tokio::test]
async fn test_realm_proxied_to_upstream() {
    // Upstream knows the full realm-qualified name and a different secret.
    let mut upstream_config = base_config("127.0.0.1");
    upstream_config.clients[0].secret = "upstream-secret".to_string();
    upstream_config.users = vec![user("carol@example.com", "s3cret")];
    let upstream = start_server(&upstream_config, None).await;

    let mut front_config = base_config("127.0.0.1");
    front_config.proxy = Some(ProxyConfig {
        listen_port: 0,
        realms: vec![RealmConfig {
            realm: "example.com".to_string(),
            address: upstream.auth.to_string(),
            secret: "upstream-secret".to_string(),
        }],
        ..ProxyConfig::default()
    });
    let front = start_server(&front_config, None).await;
    assert!(front.server.proxy_addr().unwrap().is_some());

    let client = client_for(&front, 2).await;

    let mut request = pap_request(&client, "carol@example.com", "s3cret");
    let response = client.authenticate(&mut request).await.unwrap();
    assert_eq!(response.code, Code::AccessAccept);
    assert!(response.find_attribute(AttributeCode::ProxyState.as_u8()).is_none());

    let mut request = pap_request(&client, "carol@example.com", "wrong");
    let response = client.authenticate(&mut request).await.unwrap();
    assert_eq!(response.code, Code::AccessReject);

    // Users without a configured realm are still served locally.
    let mut request = pap_request(&client, "alice", "password");
    let response = client.authenticate(&mut request).await.unwrap();
    assert_eq!(response.code, Code::AccessAccept);

    assert_eq!(front.server.proxy().unwrap().outstanding(), 0);
}
