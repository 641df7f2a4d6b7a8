pub mod datatypes;
pub mod event;
pub mod session;


// Re-export the session API for easy access
pub use event::{CloseState, Dispatch, Event, Response};
pub use session::{
    BindCredentials, BindType, DeliveryReport, EngineSession, MessageState, OutboundMessage,
    ProtocolEngine, ResendRequest, ResponseSink, Session, SessionConfig, SessionError,
    SessionResult,
};

/// Result type for session operations.
///
/// # Examples
///
/// ## Submitting through a gateway
///
/// ```rust,no_run
/// use smpp_session::{
///     BindCredentials, BindType, OutboundMessage, ProtocolEngine, Session, SessionConfig,
/// };
/// use tokio_util::sync::CancellationToken;
///
/// async fn send<E: ProtocolEngine>(engine: E) -> smpp_session::Result<()> {
///     let config = SessionConfig::new(
///         "zain",
///         BindType::Transmitter,
///         BindCredentials::new("localhost:2775", "system_id", "password"),
///     )
///     .with_max_retries(5);
///
///     let session = Session::builder(config, engine).build()?;
///     session.start(CancellationToken::new()).await?;
///
///     let seq = session
///         .submit(OutboundMessage::new(42, "SENDER", "966500000000", "Hello, World!"))
///         .await?;
///     println!("queued as {seq}: {:?}", session.status(seq).map(|s| s.state));
///
///     session.stop().await;
///     Ok(())
/// }
/// ```
pub type Result<T> = SessionResult<T>;
