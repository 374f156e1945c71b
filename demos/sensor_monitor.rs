use sensorlink::{
    BtleplugTransport, ConnectionParams, ConnectionStatus, Measurement, Result,
    SensorConnectionFactory,
};
use std::time::Duration;
use tokio::time::{interval, Instant};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    info!("📊 Sensorlink Monitor Example");
    info!("Searching for a heart rate monitor and a power meter...");

    let params = ConnectionParams::default();
    let transport = BtleplugTransport::new(params).await?;
    let factory = SensorConnectionFactory::with_params(transport, params);

    let heart_rate = match factory.connect_heart_rate().await {
        Ok(session) => {
            info!("✅ Connected to: {}", session.device_name());
            session
        }
        Err(e) => {
            error!("❌ Failed to connect to heart rate monitor: {}", e);
            return Err(e);
        }
    };

    let power = match factory.connect_power().await {
        Ok(session) => {
            info!("✅ Connected to: {}", session.device_name());
            Some(session)
        }
        Err(e) => {
            warn!("Continuing without power meter: {}", e);
            None
        }
    };

    heart_rate.add_listener(|m| {
        if let Measurement::HeartRate(sample) = m {
            println!("❤️  {:3} bpm", sample.bpm);
        }
    });
    heart_rate.on_status_change(|status| match status {
        ConnectionStatus::Reconnecting { attempt } => {
            warn!("Heart rate monitor lost, reconnect attempt {}", attempt);
        }
        ConnectionStatus::Failed => error!("❌ Heart rate monitor gave up reconnecting"),
        other => info!("Heart rate monitor {}", other),
    });

    if let Some(power) = &power {
        power.add_listener(|m| {
            if let Measurement::Power(sample) = m {
                println!("⚡ {:4} W", sample.watts);
            }
        });
        power.on_status_change(|status| info!("Power meter {}", status));
    }

    info!("Press Ctrl+C to stop monitoring");

    let start_time = Instant::now();
    let mut monitor_interval = interval(Duration::from_secs(10));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = monitor_interval.tick() => {
                let elapsed = start_time.elapsed();
                println!(
                    "\n📈 {:02}:{:02}  heart rate: {}",
                    elapsed.as_secs() / 60,
                    elapsed.as_secs() % 60,
                    heart_rate.state().await
                );
                if heart_rate.state().await.is_terminal() {
                    warn!("❌ Heart rate monitor is gone");
                    break;
                }
            }
        }
    }

    info!("🔌 Disconnecting...");
    heart_rate.disconnect().await;
    if let Some(power) = power {
        power.disconnect().await;
    }

    info!("🎉 Monitoring completed!");
    Ok(())
}
