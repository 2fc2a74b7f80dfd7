#[derive(Clone)]
struct AppState {
    inner: Arc<Mutex<LedgerApi>>,
    reply: Arc<dyn ReplyTransport>,
}

impl AppState {
    fn in_memory(config: ServiceConfig) -> Self {
        Self::new(LedgerApi::in_memory(config))
    }

    fn with_sqlite(config: ServiceConfig, path: &str) -> Result<Self, PersistenceError> {
        Ok(Self::new(LedgerApi::with_sqlite(config, path)?))
    }

    fn new(api: LedgerApi) -> Self {
        Self {
            inner: Arc::new(Mutex::new(api)),
            reply: Arc::new(LogOnlyReplyTransport),
        }
    }

    fn with_reply(api: LedgerApi, reply: Arc<dyn ReplyTransport>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(api)),
            reply,
        }
    }
}
