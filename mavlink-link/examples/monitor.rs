// Print the vehicle state as telemetry comes in
use mavlink_link::vehicle::COPTER_MODE_GUIDED;
use mavlink_link::{LinkContext, MavMessage, Vehicle};
use structopt::StructOpt;

#[derive(StructOpt, Debug)]
#[structopt(name = "monitor")]
struct Opt {
    /// Stream rate requested from the autopilot
    #[structopt(short, default_value = "4")]
    rate: u16,

    /// Arm, switch to GUIDED and take off to this altitude (m) once connected
    #[structopt(long)]
    takeoff: Option<f32>,

    #[structopt(name = "URI", default_value = "127.0.0.1:14550")]
    link_uri: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let opt = Opt::from_args();

    let link_context = LinkContext::new();
    let connection = link_context.open_link(&opt.link_uri).await?;
    let mut vehicle = Vehicle::new(connection);

    vehicle.wait_connected().await?;
    if let Some(airframe) = vehicle.state().airframe() {
        println!("Connected to a {}", airframe);
    }

    // All streams
    vehicle.request_data_stream(0, opt.rate).await?;

    if let Some(altitude) = opt.takeoff {
        vehicle.set_mode(COPTER_MODE_GUIDED).await?;
        vehicle.arm().await?;
        vehicle.takeoff(altitude).await?;
    }

    loop {
        match vehicle.update().await? {
            MavMessage::GLOBAL_POSITION_INT(_) => {
                if let Some(position) = vehicle.state().position() {
                    println!("Position: {:?}", position);
                }
            }
            MavMessage::VFR_HUD(_) => println!("Flight state: {:?}", vehicle.state().flight_state()),
            MavMessage::COMMAND_ACK(ack) => println!("Command {:?}: {:?}", ack.command, ack.result),
            _ => {}
        }
    }
}
