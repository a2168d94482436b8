use std::time::Duration;
use yeelight_lan::{
    ColorFlow, Command, DeviceRegistry, DiscoveryConfig, DiscoveryWaitPolicy, Effect, FlowAction, FlowCount,
    FlowStep, SessionConfig, SessionEvent,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let wait = std::env::args()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(Duration::from_secs(3));

    let mut registry = DeviceRegistry::with_config(DiscoveryConfig::default(), SessionConfig::default());
    let added = registry.discover(DiscoveryWaitPolicy::Timeout(wait)).await?;
    println!("Discovered {} bulb(s)", added.len());

    for (id, session) in registry.devices() {
        let snapshot = session.snapshot();
        println!(
            "{} '{}' {} power={} bright={} mode={:?}",
            id,
            snapshot.identity.name,
            session.remote_addr(),
            snapshot.state.power,
            snapshot.state.brightness,
            snapshot.state.color_mode
        );

        let mut events = session.subscribe();
        session.send(&Command::get_prop(["power", "bright", "ct", "rgb"]))?;

        let flow = ColorFlow::new()
            .step(FlowStep::Rgb {
                rgb: 0xFF0000,
                brightness: 80,
                duration: Duration::from_millis(500),
            })?
            .step(FlowStep::Rgb {
                rgb: 0x0000FF,
                brightness: 80,
                duration: Duration::from_millis(500),
            })?;
        session.send(&Command::start_cf(FlowCount::Finite(4), FlowAction::Recover, &flow)?)?;
        session.send(&Command::set_bright(50, Effect::Smooth, Duration::from_millis(300))?)?;

        let deadline = tokio::time::sleep(Duration::from_secs(2));
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                _ = &mut deadline => break,
                event = events.recv() => match event {
                    Ok(SessionEvent::Closed(status)) => {
                        println!("  session ended: {:?}", status);
                        break;
                    }
                    Ok(SessionEvent::Result { id, values }) => println!("  result #{:?}: {:?}", id, values),
                    Ok(SessionEvent::Error(e)) => println!("  error: {}", e),
                    Ok(SessionEvent::StateChanged(updates)) => println!("  changed: {:?}", updates),
                    Ok(other) => println!("  {:?}", other),
                    Err(e) => {
                        println!("  events ended: {}", e);
                        break;
                    }
                },
            }
        }
    }

    registry.close_all();
    Ok(())
}
