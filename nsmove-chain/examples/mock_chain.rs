//! Relocation chain against the mock provider

use std::sync::Arc;

use nsmove_chain::{ChainBuilder, NetworkService, RelocationElement, RequestContext};
use nsmove_core::{Connection, ConnectionId, KernelMechanism};
use nsmove_netns::{MockNetNs, MockOp, NetNsWorker, RelocationConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    println!("🧪 Relocating with MockNetNs (no root required)\n");

    let mock = MockNetNs::new();
    let client = mock.add_namespace("/var/run/netns/client1");
    mock.add_interface(mock.home(), "veth0");

    let config = RelocationConfig::default();
    let worker = Arc::new(NetNsWorker::spawn(Arc::new(mock.clone()), &config)?);

    let element_worker = Arc::clone(&worker);
    let chain = ChainBuilder::new()
        .with(move |next| RelocationElement::new(element_worker, &config, next))
        .build();

    let conn = Connection::new(ConnectionId::new("conn-1")?).with_mechanism(
        KernelMechanism::new()
            .with_netns_url("client1")
            .with_interface_name("veth0"),
    );
    let ctx = RequestContext::server();

    let conn = chain.request(&ctx, conn).await?;
    println!("✅ Request: veth0 is in {:?}", mock.interface_namespace("veth0"));
    println!("   (client namespace is {client})");

    chain.close(&ctx, conn).await?;
    println!("✅ Close:   veth0 is in {:?}", mock.interface_namespace("veth0"));

    println!("\n📞 setns calls: {}", mock.count(MockOp::SetCurrent));
    println!("🔓 Open handles: {}", mock.open_handles());

    Ok(())
}
