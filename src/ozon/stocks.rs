//! `ozon stocks`: current FBO stock snapshot per product, cluster and warehouse.

use crate::{
    api::MarketplaceApi,
    models::{Cell, KeyPredicate, Row, Table},
    period::{DATE_FORMAT, PeriodWindow},
    pipeline::ReportOutput,
    retry::RequestError,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub const ATTRIBUTES_PATH: &str = "/v4/product/info/attributes";
pub const ANALYTICS_STOCKS_PATH: &str = "/v1/analytics/stocks";
pub const ATTRIBUTES_LIMIT: usize = 1000;
pub const SKU_CHUNK: usize = 100;

pub const STORE_COLUMN: &str = "Store";
pub const DATE_COLUMN: &str = "Date";

pub const HEADERS: [&str; 31] = [
    "Артикул",
    "Название товара",
    "SKU",
    "Теги",
    "Зона размещения",
    "Кластер",
    "ID кластера",
    "Склад",
    "ID склада",
    "Доступно к продаже",
    "Валидный сток",
    "Ожидают документов",
    "Маркируемые товары, ожидающие УПД",
    "Истекает срок годности",
    "Брак в пути",
    "Брак на складе",
    "Излишки",
    "Прочее",
    "Запрошено",
    "В пути",
    "Возвраты от покупателей",
    "Возвраты продавцу",
    "Среднесуточные продажи",
    "Дней без продаж",
    "Дней хватит",
    "Оборачиваемость",
    "Среднесуточные продажи кластера",
    "Дней без продаж кластера",
    "Дней хватит кластера",
    "Оборачиваемость кластера",
    "ID макрокластера",
];

#[derive(Debug, Serialize)]
struct AttributesRequest {
    filter: AttributesFilter,
    limit: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_id: Option<String>,
    sort_dir: &'static str,
}

#[derive(Debug, Serialize)]
struct AttributesFilter {
    visibility: &'static str,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct AttributesPage {
    result: Vec<ProductAttributes>,
    total: u64,
    last_id: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct ProductAttributes {
    pub product_id: Option<i64>,
    pub offer_id: Option<String>,
    pub sku: Option<i64>,
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
struct StocksRequest<'a> {
    skus: &'a [i64],
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct StocksResponse {
    items: Vec<StockItem>,
}

/// One product on one warehouse of one cluster.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct StockItem {
    pub sku: Option<i64>,
    pub name: Option<String>,
    pub offer_id: Option<String>,
    pub warehouse_id: Option<i64>,
    pub warehouse_name: Option<String>,
    pub cluster_id: Option<i64>,
    pub cluster_name: Option<String>,
    pub macrolocal_cluster_id: Option<i64>,
    pub item_tags: Vec<String>,
    pub ads: Option<f64>,
    pub ads_cluster: Option<f64>,
    pub available_stock_count: Option<f64>,
    pub valid_stock_count: Option<f64>,
    pub waiting_docs_stock_count: Option<f64>,
    pub expiring_stock_count: Option<f64>,
    pub transit_defect_stock_count: Option<f64>,
    pub stock_defect_stock_count: Option<f64>,
    pub excess_stock_count: Option<f64>,
    pub other_stock_count: Option<f64>,
    pub requested_stock_count: Option<f64>,
    pub transit_stock_count: Option<f64>,
    pub return_from_customer_stock_count: Option<f64>,
    pub return_to_seller_stock_count: Option<f64>,
    pub days_without_sales: Option<f64>,
    pub days_without_sales_cluster: Option<f64>,
    pub idc: Option<f64>,
    pub idc_cluster: Option<f64>,
    pub turnover_grade: Option<String>,
    pub turnover_grade_cluster: Option<String>,
}

/// Every product of the account, following `last_id` until a short page, an empty page, or
/// `total` is reached.
pub async fn fetch_products(api: &MarketplaceApi) -> Result<Vec<ProductAttributes>, RequestError> {
    let mut products = Vec::new();
    let mut last_id: Option<String> = None;
    loop {
        let request = AttributesRequest {
            filter: AttributesFilter { visibility: "ALL" },
            limit: ATTRIBUTES_LIMIT,
            last_id: last_id.clone(),
            sort_dir: "ASC",
        };
        let page: AttributesPage = api.post_json(ATTRIBUTES_PATH, &request).await?;
        let count = page.result.len();
        if count == 0 {
            break;
        }
        products.extend(page.result);
        debug!(target: "reports.ozon", page = count, collected = products.len(), "product attributes page");

        let next = page.last_id.filter(|id| !id.is_empty());
        let reached_total = page.total > 0 && products.len() as u64 >= page.total;
        match next {
            Some(id) if count >= ATTRIBUTES_LIMIT && !reached_total => last_id = Some(id),
            _ => break,
        }
    }
    Ok(products)
}

/// Distinct SKUs in first-seen order; products without one are skipped.
pub fn unique_skus(products: &[ProductAttributes]) -> Vec<i64> {
    let mut seen = std::collections::HashSet::new();
    products
        .iter()
        .filter_map(|product| product.sku)
        .filter(|sku| seen.insert(*sku))
        .collect()
}

/// Stock analytics for `skus`, requested [`SKU_CHUNK`] at a time.
pub async fn fetch_stocks(api: &MarketplaceApi, skus: &[i64]) -> Result<Vec<StockItem>, RequestError> {
    let mut items = Vec::new();
    for chunk in skus.chunks(SKU_CHUNK) {
        let response: StocksResponse = api
            .post_json(ANALYTICS_STOCKS_PATH, &StocksRequest { skus: chunk })
            .await?;
        items.extend(response.items);
        debug!(target: "reports.ozon", chunk = chunk.len(), rows = items.len(), "stock analytics chunk");
    }
    info!(target: "reports.ozon", skus = skus.len(), rows = items.len(), "stock analytics fetched");
    Ok(items)
}

fn count(value: Option<f64>) -> Cell {
    Cell::Number(value.unwrap_or(0.0))
}

fn text(value: &Option<String>) -> Cell {
    Cell::from(value.clone().unwrap_or_default())
}

fn id(value: Option<i64>) -> Cell {
    value.map(Cell::from).unwrap_or_else(Cell::empty)
}

fn stock_row(item: &StockItem) -> Row {
    vec![
        text(&item.offer_id),
        text(&item.name),
        id(item.sku),
        Cell::from(item.item_tags.join(",")),
        // Placement zone and marked goods awaiting UPD have no API field.
        Cell::empty(),
        text(&item.cluster_name),
        id(item.cluster_id),
        text(&item.warehouse_name),
        id(item.warehouse_id),
        count(item.available_stock_count),
        count(item.valid_stock_count),
        count(item.waiting_docs_stock_count),
        Cell::empty(),
        count(item.expiring_stock_count),
        count(item.transit_defect_stock_count),
        count(item.stock_defect_stock_count),
        count(item.excess_stock_count),
        count(item.other_stock_count),
        count(item.requested_stock_count),
        count(item.transit_stock_count),
        count(item.return_from_customer_stock_count),
        count(item.return_to_seller_stock_count),
        count(item.ads),
        count(item.days_without_sales),
        count(item.idc),
        text(&item.turnover_grade),
        count(item.ads_cluster),
        count(item.days_without_sales_cluster),
        count(item.idc_cluster),
        text(&item.turnover_grade_cluster),
        id(item.macrolocal_cluster_id),
    ]
}

/// Prefixes `Store` and `Date` (snapshot day) and keys the sheet upsert on that pair.
pub fn build_output(items: &[StockItem], store: &str, store_name: &str, window: PeriodWindow) -> ReportOutput {
    let date = window.end().format(DATE_FORMAT).to_string();
    let table = Table::new(
        HEADERS.iter().map(|h| h.to_string()).collect(),
        items.iter().map(stock_row).collect(),
    )
    .prepend_columns(&[
        (STORE_COLUMN, Cell::from(store_name)),
        (DATE_COLUMN, Cell::from(date.as_str())),
    ]);
    let key = KeyPredicate::default()
        .exact(0, store_name)
        .date_range(1, window.end(), window.end());
    ReportOutput {
        table,
        file_name: format!("ozon-{store}-stocks-{date}.csv"),
        sheet_name: format!("ozon-{store}-stocks"),
        key,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        clock::recording::RecordingSleeper,
        http::{RequestConfig, scripted::RoutedClient},
        sink::key_matches,
    };
    use chrono::NaiveDate;
    use serde_json::{Value, json};
    use std::sync::Arc;

    fn api(client: Arc<RoutedClient>) -> MarketplaceApi {
        MarketplaceApi::new(
            client,
            Arc::new(RecordingSleeper::default()),
            RequestConfig::new("https://seller.test", "ozon"),
        )
    }

    fn bodies(client: &RoutedClient) -> Vec<Value> {
        client
            .calls
            .lock()
            .unwrap()
            .iter()
            .map(|call| serde_json::from_str(call.body.as_deref().unwrap_or("null")).expect("json body"))
            .collect()
    }

    fn products(skus: std::ops::Range<i64>) -> Vec<Value> {
        skus.map(|sku| json!({"product_id": sku, "offer_id": format!("OF-{sku}"), "sku": sku, "name": "Нож"}))
            .collect()
    }

    #[tokio::test]
    async fn attributes_follow_last_id_until_a_short_page() {
        let client = Arc::new(RoutedClient::new());
        client
            .json(
                ATTRIBUTES_PATH,
                json!({"result": products(0..1000), "total": 1500, "last_id": "p2"}),
            )
            .json(
                ATTRIBUTES_PATH,
                json!({"result": products(1000..1500), "total": 1500, "last_id": "p3"}),
            );

        let all = fetch_products(&api(client.clone())).await.expect("products");

        assert_eq!(all.len(), 1500);
        let sent = bodies(&client);
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0]["filter"], json!({"visibility": "ALL"}));
        assert_eq!(sent[0]["sort_dir"], "ASC");
        assert!(sent[0].get("last_id").is_none());
        assert_eq!(sent[1]["last_id"], "p2");
    }

    #[tokio::test]
    async fn empty_first_page_means_no_products() {
        let client = Arc::new(RoutedClient::new());
        client.json(ATTRIBUTES_PATH, json!({"result": [], "total": 0, "last_id": ""}));

        let all = fetch_products(&api(client)).await.expect("products");

        assert!(all.is_empty());
        assert!(unique_skus(&all).is_empty());
    }

    #[tokio::test]
    async fn stocks_are_requested_in_chunks_of_one_hundred() {
        let client = Arc::new(RoutedClient::new());
        client
            .json(ANALYTICS_STOCKS_PATH, json!({"items": [{"sku": 1}, {"sku": 2}]}))
            .json(ANALYTICS_STOCKS_PATH, json!({"items": [{"sku": 150}]}));
        let skus: Vec<i64> = (0..150).collect();

        let items = fetch_stocks(&api(client.clone()), &skus).await.expect("stocks");

        assert_eq!(items.len(), 3);
        let sent = bodies(&client);
        assert_eq!(sent[0]["skus"].as_array().map(Vec::len), Some(100));
        assert_eq!(sent[1]["skus"].as_array().map(Vec::len), Some(50));
    }

    #[test]
    fn skus_are_distinct_in_first_seen_order() {
        let list = |sku: Option<i64>| ProductAttributes {
            sku,
            ..ProductAttributes::default()
        };
        let skus = unique_skus(&[list(Some(7)), list(None), list(Some(3)), list(Some(7))]);
        assert_eq!(skus, [7, 3]);
    }

    #[test]
    fn snapshot_rows_default_missing_counts_to_zero() {
        let item: StockItem = serde_json::from_value(json!({
            "sku": 42,
            "name": "Нож",
            "offer_id": "KN-1",
            "warehouse_id": 9,
            "warehouse_name": "Хоругвино",
            "cluster_id": 4,
            "cluster_name": "Москва",
            "item_tags": ["A", "B"],
            "ads": null,
            "available_stock_count": 12,
            "turnover_grade": "GREEN"
        }))
        .expect("item");
        let day = NaiveDate::from_ymd_opt(2026, 2, 9).expect("date");
        let output = build_output(&[item], "lee", "Lee Shop", PeriodWindow::single(day));

        assert_eq!(output.table.header.len(), HEADERS.len() + 2);
        assert_eq!(output.table.header[..3], ["Store", "Date", "Артикул"]);
        let row = &output.table.rows[0];
        let at = |name: &str| &row[output.table.column_index(name).expect("column")];
        assert_eq!(row[1], Cell::from("2026-02-09"));
        assert_eq!(*at("SKU"), Cell::Number(42.0));
        assert_eq!(*at("Теги"), Cell::from("A,B"));
        assert_eq!(*at("Зона размещения"), Cell::empty());
        assert_eq!(*at("Доступно к продаже"), Cell::Number(12.0));
        assert_eq!(*at("Среднесуточные продажи"), Cell::Number(0.0));
        assert_eq!(*at("Оборачиваемость"), Cell::from("GREEN"));
        assert_eq!(*at("ID макрокластера"), Cell::empty());

        assert_eq!(output.file_name, "ozon-lee-stocks-2026-02-09.csv");
        assert_eq!(output.sheet_name, "ozon-lee-stocks");
        let same = vec!["Lee Shop".to_string(), "09.02.2026".into()];
        let earlier = vec!["Lee Shop".to_string(), "2026-02-08".into()];
        assert!(key_matches(&output.key, &same));
        assert!(!key_matches(&output.key, &earlier));
    }
}
