// ABOUTME: Demo application running a gateway session against an in-process loopback SMSC
// ABOUTME: Shows submit, rate limiting, delivery receipts on the delivery stream and ordered stop

use argh::FromArgs;
use bytes::Bytes;
use smpp_session::datatypes::CommandStatus;
use smpp_session::event::{DeliverSm, Event, SubmitSmResp};
use smpp_session::session::{
    BindCredentials, BindType, EngineError, EngineSession, EventDispatcher, OutboundMessage,
    ProtocolEngine, Session, SessionConfig, Settings,
};
use std::error::Error;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Submit messages through a loopback SMSC that acknowledges and delivers each one
#[derive(FromArgs)]
struct CliArgs {
    /// whether or not to enable debugging
    #[argh(switch, short = 'd')]
    debugging: bool,

    /// number of messages to submit (default: 10)
    #[argh(option, short = 'n')]
    messages: Option<u32>,

    /// submissions per second (default: 5)
    #[argh(option, short = 'r')]
    rate: Option<f64>,

    /// how the session binds: trx, tx or rx (default: trx)
    #[argh(option, short = 'b')]
    bind: Option<String>,
}

/// Acknowledges every submit_sm after 20ms and sends its receipt 50ms later.
struct LoopbackEngine {
    next_id: Arc<AtomicU64>,
}

struct LoopbackSession {
    handler: Arc<EventDispatcher>,
    next_id: Arc<AtomicU64>,
}

impl EngineSession for LoopbackSession {
    async fn submit(&self, sequence_number: u32, message: &OutboundMessage) -> Result<(), EngineError> {
        let handler = Arc::clone(&self.handler);
        let message_id = format!("{:08x}", self.next_id.fetch_add(1, Ordering::Relaxed));
        let (sender, number) = (message.sender.clone(), message.number.clone());

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            handler
                .on_event(Event::SubmitSmResp(SubmitSmResp {
                    command_status: CommandStatus::Ok,
                    sequence_number,
                    message_id: message_id.clone(),
                }))
                .await;

            tokio::time::sleep(Duration::from_millis(50)).await;
            let receipt = format!(
                "id:{message_id} sub:001 dlvrd:001 stat:DELIVRD err:000 text:loopback"
            );
            handler
                .on_event(Event::DeliverSm(DeliverSm {
                    sequence_number: sequence_number.wrapping_add(1_000_000),
                    source_addr: number,
                    destination_addr: sender,
                    esm_class: 0x04,
                    short_message: Bytes::from(receipt),
                }))
                .await;
        });
        Ok(())
    }

    async fn close(&self) -> Result<(), EngineError> {
        Ok(())
    }
}

impl ProtocolEngine for LoopbackEngine {
    type Session = LoopbackSession;

    async fn connect(
        &self,
        role: BindType,
        credentials: &BindCredentials,
        settings: Settings,
        _rebind_interval: Duration,
    ) -> Result<LoopbackSession, EngineError> {
        tracing::info!(role = role.as_str(), smsc = %credentials.smsc, "loopback bind");
        Ok(LoopbackSession {
            handler: settings.handler,
            next_id: Arc::clone(&self.next_id),
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli_args: CliArgs = argh::from_env();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(if cli_args.debugging { Level::DEBUG } else { Level::INFO })
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let count = cli_args.messages.unwrap_or(10);
    let bind_type = match cli_args.bind.as_deref().unwrap_or("trx") {
        "tx" => BindType::Transmitter,
        "rx" => BindType::Receiver,
        _ => BindType::Transceiver,
    };

    let config = SessionConfig::new(
        "loopback",
        bind_type,
        BindCredentials::new("loopback:2775", "demo", "secret"),
    )
    .with_rate_limit(cli_args.rate.unwrap_or(5.0), 2)
    .with_max_outstanding(4);

    let engine = LoopbackEngine {
        next_id: Arc::new(AtomicU64::new(1)),
    };
    let session = Arc::new(Session::builder(config, engine).build()?);
    session.start(CancellationToken::new()).await?;

    let mut deliveries = session.deliveries();
    let reader = tokio::spawn(async move {
        let mut received = 0;
        while let Some(report) = deliveries.recv().await {
            received += 1;
            println!(
                "receipt for app message {:?}: {}",
                report.application_id,
                report.state.map(|s| s.as_str()).unwrap_or("-")
            );
        }
        received
    });

    for id in 0..count {
        let message = OutboundMessage::new(i64::from(id), "DEMO", "966500000000", "Hello!");
        let seq = session.submit(message).await?;
        println!("submitted app message {id} as sequence {seq}");
    }

    // Give the loopback time to send the last receipts.
    tokio::time::sleep(Duration::from_millis(500)).await;
    session.stop().await;

    let received = reader.await?;
    println!("{received}/{count} receipts received");
    Ok(())
}
