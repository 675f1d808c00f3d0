use std::sync::Arc;
use std::time::Duration as StdDuration;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::application::notifier::NotifierSubscriber;
use crate::application::order_manager::{OrderManagerSubscriber, OrderSizing};
use crate::application::orchestrator::{OrchestratorCommand, ScanOrchestrator};
use crate::application::ports::ExchangeDataPort;
use crate::application::signal_bus::SignalBus;
use crate::config::Config;
use crate::infrastructure::binance::BinanceFuturesClient;
use crate::infrastructure::dashboard::{DashboardBroadcaster, TradingViewChartLink};
use crate::infrastructure::persistence::{Database, SqliteAlertStore};
use crate::infrastructure::telegram::TelegramNotifier;

/// Default size of the dashboard's replay buffer: enough recent alerts for a
/// client that connects mid-session to catch up without unbounded growth.
const DASHBOARD_REPLAY_CAPACITY: usize = 200;
/// Command channel depth between `start`'s shutdown task and the
/// orchestrator's `run` loop.
const COMMAND_CHANNEL_CAPACITY: usize = 8;

/// Handles kept alive for the process's lifetime after `start`, mirroring
/// the bot's own pattern of returning a thin handle rather than the whole
/// `Application`.
pub struct SystemHandle {
    pub cmd_tx: mpsc::Sender<OrchestratorCommand>,
    pub signal_bus: Arc<SignalBus>,
    pub alert_store: Arc<SqliteAlertStore>,
    pub dashboard: Arc<DashboardBroadcaster>,
}

/// Wires every adapter and subscriber together from a loaded [`Config`] and
/// owns them until the orchestrator's scan loop and the dashboard's
/// websocket server are both spawned.
pub struct Application {
    config: Config,
    exchange: Arc<BinanceFuturesClient>,
    signal_bus: Arc<SignalBus>,
    database: Arc<Database>,
    alert_store: Arc<SqliteAlertStore>,
    dashboard: Arc<DashboardBroadcaster>,
    orchestrator: ScanOrchestrator,
    order_manager: Option<Arc<OrderManagerSubscriber<Arc<BinanceFuturesClient>>>>,
    cmd_tx: mpsc::Sender<OrchestratorCommand>,
}

impl Application {
    pub async fn build(config: Config) -> Result<Self> {
        info!(symbols = ?config.symbols, timeframes = ?config.timeframes, "building scanner application");

        let exchange = Arc::new(
            BinanceFuturesClient::builder()
                .api_key(config.binance_api_key.clone())
                .api_secret(config.binance_api_secret.clone())
                .build(),
        );

        let database = Arc::new(Database::new(&config.database_url).await?);
        let alert_store = Arc::new(SqliteAlertStore::new(database.pool.clone()));
        let dashboard = Arc::new(DashboardBroadcaster::new(DASHBOARD_REPLAY_CAPACITY));
        let bot = Arc::new(TelegramNotifier::new(config.telegram_bot_token.clone(), config.telegram_chat_id.clone()));
        let chart_link = TradingViewChartLink::default();

        let signal_bus = Arc::new(SignalBus::new());

        let notifier = NotifierSubscriber::new(bot, dashboard.clone(), alert_store.clone(), chart_link, None);
        signal_bus.subscribe(Arc::new(notifier)).await;

        let order_manager = if config.enable_trading {
            let sizing = OrderSizing { position_size_usdt: config.position_size, leverage: config.leverage };
            let order_manager = Arc::new(OrderManagerSubscriber::new(exchange.clone(), sizing));
            signal_bus.subscribe(order_manager.clone()).await;
            info!("live order management enabled");
            Some(order_manager)
        } else {
            info!("trading disabled, running in signal-only mode");
            None
        };

        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let allow_list = config.allow_list.to_allow_list();
        let exchange_port: Arc<dyn ExchangeDataPort> = exchange.clone();
        let orchestrator = ScanOrchestrator::new(
            exchange_port,
            signal_bus.clone(),
            config.timeframes.clone(),
            config.quote_currency.clone(),
            config.min_volume_24h,
            config.max_pairs,
            config.pivot_left,
            config.pivot_right,
            allow_list,
            config.symbols.clone(),
            Some(cmd_rx),
            config.keep_pivots,
            config.update_interval,
        );

        Ok(Self { config, exchange, signal_bus, database, alert_store, dashboard, orchestrator, order_manager, cmd_tx })
    }

    pub async fn start(self) -> Result<SystemHandle> {
        let Self { config, exchange: _, signal_bus, database: _, alert_store, dashboard, mut orchestrator, order_manager, cmd_tx } = self;

        info!("starting scan orchestrator");
        tokio::spawn(async move {
            orchestrator.run().await;
        });

        if let Some(order_manager) = order_manager {
            let poll_interval = StdDuration::from_secs(config.update_interval.max(1));
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(poll_interval);
                loop {
                    ticker.tick().await;
                    if let Err(err) = order_manager.poll_fills().await {
                        error!(%err, "order fill reconciliation pass failed");
                    }
                }
            });
        }

        let dashboard_addr = format!("{}:{}", config.flask_host, config.flask_port).parse::<std::net::SocketAddr>();
        match dashboard_addr {
            Ok(addr) => {
                let dashboard_server = dashboard.clone();
                tokio::spawn(async move {
                    if let Err(err) = dashboard_server.serve(addr).await {
                        error!(%err, "dashboard websocket server exited");
                    }
                });
            }
            Err(err) => {
                error!(%err, host = %config.flask_host, port = config.flask_port, "invalid dashboard bind address, websocket server not started");
            }
        }

        let shutdown_tx = cmd_tx.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("received Ctrl+C, shutting down scan loop");
                    let _ = shutdown_tx.send(OrchestratorCommand::Shutdown).await;
                }
                Err(err) => error!(%err, "unable to listen for shutdown signal"),
            }
        });

        Ok(SystemHandle { cmd_tx, signal_bus, alert_store, dashboard })
    }
}
