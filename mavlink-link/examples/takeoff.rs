// Connect to a vehicle, wait for its heartbeat and send it a takeoff command
use mavlink_link::LinkContext;
use structopt::StructOpt;

#[derive(StructOpt, Debug)]
#[structopt(name = "takeoff")]
struct Opt {
    #[structopt(name = "URI", default_value = "127.0.0.1:14550")]
    link_uri: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let opt = Opt::from_args();

    let link_context = LinkContext::new();
    let vehicle = link_context.open_link(&opt.link_uri).await?;
    println!("{}", vehicle);
    println!("{}", vehicle.target_system());

    vehicle.wait_heartbeat().await?;
    println!("{:?}", vehicle.messages().await);
    if let Some(heartbeat) = vehicle.message("HEARTBEAT").await {
        println!("{:?}", heartbeat);
    }

    vehicle.send_takeoff(0, [0.0; 7]).await?;
    vehicle.close().await;

    Ok(())
}
