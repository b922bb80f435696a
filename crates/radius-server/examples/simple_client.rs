use radius_proto::{AttributeCode, Code, Dictionary};
use radius_server::{ClientConfig, Endpoint, RadiusClient};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 4 {
        eprintln!("Usage: {} <username> <password> <secret> [server_addr]", args[0]);
        eprintln!("Example: {} admin admin123 testing123 127.0.0.1:1812", args[0]);
        std::process::exit(1);
    }

    let username = &args[1];
    let password = &args[2];
    let secret = &args[3];
    let server_addr = args.get(4).map(|s| s.as_str()).unwrap_or("127.0.0.1:1812").parse()?;

    println!("Server: {}", server_addr);
    println!("Username: {}", username);
    println!();

    let dictionary = Arc::new(Dictionary::standard()?);
    let client = RadiusClient::new(ClientConfig::new(Endpoint::new(server_addr, secret)), dictionary).await?;

    let mut request = client.new_request(Code::AccessRequest);
    request.add_text("User-Name", username)?;
    request.add_text("NAS-IP-Address", "127.0.0.1")?;
    request.user_password = Some(password.clone());

    println!("Sending Access-Request (id {})...", request.identifier);
    let response = client.authenticate(&mut request).await?;

    println!("Received {} (id {})", response.code, response.identifier);
    for attribute in &response.attributes {
        println!("  {}", attribute.display(response.dictionary()));
    }
    if let Some(timeout) = response.integer(AttributeCode::SessionTimeout) {
        println!("Session timeout: {}s", timeout);
    }

    if response.code == Code::AccessAccept {
        println!("Authentication successful");
        Ok(())
    } else {
        println!("Authentication failed");
        std::process::exit(1);
    }
}
