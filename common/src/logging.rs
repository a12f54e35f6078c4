//! Tracing subscriber scaffolding: stderr formatting plus an optional
//! capture layer used by the exec-side `INTERNAL` log pipeline (§4.5) to
//! turn emitted events into structured records without going through a
//! second logging facade.

/// A structured record captured off the `tracing` pipeline, independent of
/// the wire `Request` type (which lives in `devsync-transport` and would
/// create a dependency cycle if referenced from here).
#[derive(Clone, Debug)]
pub struct LogRecord {
    pub logger: String,
    pub level: String,
    pub file: Option<String>,
    pub line: Option<u32>,
    /// Name of the span enclosing the event, if any - the closest `tracing`
    /// analogue to a Python `funcName` (§3 Data Model).
    pub function: Option<String>,
    pub message: String,
}

/// A `tracing_subscriber::Layer` that forwards every event as a [`LogRecord`]
/// on an unbounded channel. Cloning shares the same sender.
#[derive(Debug, Clone)]
pub struct CapturingLayer {
    sender: tokio::sync::mpsc::UnboundedSender<LogRecord>,
}

impl CapturingLayer {
    #[must_use]
    pub fn new() -> (Self, tokio::sync::mpsc::UnboundedReceiver<LogRecord>) {
        let (sender, receiver) = tokio::sync::mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

/// Field names carrying an attached error, whose value becomes the
/// appended "traceback" (§4.5). Mirrors the `%err`/`err`/`error` fields
/// `tracing::warn!`/`error!` call sites use elsewhere in this workspace.
const EXCEPTION_FIELDS: &[&str] = &["err", "error", "exception"];

struct FieldVisitor {
    fields: std::collections::HashMap<String, String>,
    message: Option<String>,
    exception: Option<String>,
}

impl FieldVisitor {
    fn new() -> Self {
        Self {
            fields: std::collections::HashMap::new(),
            message: None,
            exception: None,
        }
    }

    fn record(&mut self, field: &tracing::field::Field, value_str: String) {
        if field.name() == "message" {
            self.message = Some(value_str);
        } else if EXCEPTION_FIELDS.contains(&field.name()) {
            self.exception = Some(value_str);
        } else {
            self.fields.insert(field.name().to_string(), value_str);
        }
    }
}

impl tracing_subscriber::field::Visit for FieldVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.record(field, format!("{value:?}"));
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.record(field, value.to_string());
    }
}

impl<S> tracing_subscriber::Layer<S> for CapturingLayer
where
    S: tracing::Subscriber + for<'lookup> tracing_subscriber::registry::LookupSpan<'lookup>,
{
    fn on_event(
        &self,
        event: &tracing::Event<'_>,
        ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let mut visitor = FieldVisitor::new();
        event.record(&mut visitor);
        let mut message = visitor.message.unwrap_or_else(|| {
            if visitor.fields.is_empty() {
                String::new()
            } else {
                format!("{:?}", visitor.fields)
            }
        });
        // Formatted traceback appended when an exception was attached (§4.5).
        if let Some(exception) = visitor.exception {
            message = if message.is_empty() {
                exception
            } else {
                format!("{message}\n{exception}")
            };
        }
        if message.is_empty() {
            // Empty messages are dropped upstream by the log pipeline (§4.5);
            // still worth skipping here so the channel doesn't fill with noise.
            return;
        }
        let metadata = event.metadata();
        let function = ctx.lookup_current().map(|span| span.name().to_string());
        let record = LogRecord {
            logger: metadata.target().to_string(),
            level: metadata.level().to_string(),
            file: metadata.file().map(str::to_string),
            line: metadata.line(),
            function,
            message,
        };
        let _ = self.sender.send(record);
    }
}

/// Installs a stderr `fmt` layer filtered by `RUST_LOG` (falling back to
/// `verbose`), plus the optional capture layer from [`crate::config::TracingConfig`].
pub fn init(output: &crate::config::OutputConfig, tracing_cfg: crate::config::TracingConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let default_directive = if output.quiet {
        "error"
    } else {
        match output.verbose {
            0 => "info",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(true);

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer);

    match tracing_cfg.capture_layer {
        Some(capture) => registry.with(capture).init(),
        None => registry.init(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::layer::SubscriberExt;

    #[test]
    fn appends_exception_field_as_traceback() {
        let (layer, mut receiver) = CapturingLayer::new();
        let subscriber = tracing_subscriber::registry().with(layer);
        let _guard = tracing::subscriber::set_default(subscriber);

        let err = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        tracing::error!(err = %err, "operation failed");

        let record = receiver.try_recv().unwrap();
        assert_eq!(record.message, "operation failed\nboom");
    }

    #[test]
    fn captures_enclosing_span_as_function() {
        let (layer, mut receiver) = CapturingLayer::new();
        let subscriber = tracing_subscriber::registry().with(layer);
        let _guard = tracing::subscriber::set_default(subscriber);

        let span = tracing::info_span!("do_work");
        let _enter = span.enter();
        tracing::info!("inside span");

        let record = receiver.try_recv().unwrap();
        assert_eq!(record.function.as_deref(), Some("do_work"));
    }

    #[test]
    fn event_outside_any_span_has_no_function() {
        let (layer, mut receiver) = CapturingLayer::new();
        let subscriber = tracing_subscriber::registry().with(layer);
        let _guard = tracing::subscriber::set_default(subscriber);

        tracing::info!("top level");

        let record = receiver.try_recv().unwrap();
        assert_eq!(record.function, None);
    }
}
