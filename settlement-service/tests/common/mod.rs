use rust_decimal::Decimal;
use service_core::config::Config as CoreConfig;
use settlement_service::config::{MongoConfig, SettlementConfig, SettlementSettings, StorageBackend};
use settlement_service::models::{MenuItem, OpenOrder, OrderLineItem, OrderStatus, TableIdentifier};
use settlement_service::services::MemoryStore;
use settlement_service::startup::{memory_backends, Application};

pub const TEST_RESTAURANT_ID: &str = "64b7f0c2a1b2c3d4e5f60718";

pub struct TestApp {
    pub http_address: String,
    pub http_port: u16,
    pub store: MemoryStore,
    pub client: reqwest::Client,
}

impl TestApp {
    pub async fn spawn() -> Self {
        // Use random port for testing (port 0)
        let config = SettlementConfig {
            common: CoreConfig {
                port: 0,
                ..CoreConfig::default()
            },
            mongodb: MongoConfig {
                uri: String::new(),
                database: String::new(),
            },
            storage: StorageBackend::Memory,
            settlement: SettlementSettings::default(),
            cors_origins: vec![],
            otlp_endpoint: None,
        };

        let store = MemoryStore::new();
        let app = Application::build_with_backends(config, memory_backends(store.clone()))
            .await
            .expect("Failed to build test application");

        let http_port = app.http_port();
        let http_address = format!("http://127.0.0.1:{}", http_port);

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        // Wait for HTTP server to be ready by polling health endpoint
        let client = reqwest::Client::new();
        let health_url = format!("{}/health", http_address);
        for _ in 0..50 {
            if client.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        }

        TestApp {
            http_address,
            http_port,
            store,
            client,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.http_address, path)
    }

    pub fn table_url(&self, table: &str, action: &str) -> String {
        self.url(&format!(
            "/api/restaurants/{}/tables/{}/{}",
            TEST_RESTAURANT_ID, table, action
        ))
    }

    /// Burger 150 and fries 80 on the menu; table 5 has a confirmed order for
    /// two burgers (stored as text) and a cancelled fries order (stored as a
    /// number); table 6 has one pending fries order.
    pub async fn seed_dinner_service(&self) {
        self.store
            .insert_menu_item(MenuItem::new("burger", "Burger", dec("150")))
            .await;
        self.store
            .insert_menu_item(MenuItem::new("fries", "Fries", dec("80")))
            .await;
        self.add_order(
            Some(TableIdentifier::from("5")),
            vec![OrderLineItem::new("burger", 2, Some(dec("150")))],
            OrderStatus::Confirmed,
        )
        .await;
        self.add_order(
            Some(TableIdentifier::Number(5.0)),
            vec![OrderLineItem::new("fries", 1, Some(dec("80")))],
            OrderStatus::Cancelled,
        )
        .await;
        self.add_order(
            Some(TableIdentifier::from("6")),
            vec![OrderLineItem::new("fries", 1, Some(dec("80")))],
            OrderStatus::Pending,
        )
        .await;
    }

    pub async fn add_order(
        &self,
        table: Option<TableIdentifier>,
        items: Vec<OrderLineItem>,
        status: OrderStatus,
    ) -> String {
        let order = OpenOrder::new(TEST_RESTAURANT_ID, table, items, status);
        let id = order.id.clone();
        self.store.insert_order(order).await;
        id
    }
}

pub fn dec(s: &str) -> Decimal {
    s.parse().expect("valid decimal literal")
}
