//! `wb funnel`: per-card sales funnel (views to buyouts) for a period.

use crate::{
    api::MarketplaceApi,
    models::{Cell, KeyPredicate, Row, Table},
    period::{DATE_FORMAT, PeriodWindow, week_of_year},
    pipeline::ReportOutput,
    retry::RequestError,
};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const PRODUCTS_PATH: &str = "/api/analytics/v3/sales-funnel/products";
pub const PAGE_LIMIT: usize = 1000;

pub const STORE_COLUMN: &str = "Store";
pub const DATE_COLUMN: &str = "Дата";

pub const HEADERS: [&str; 34] = [
    "Год",
    "Мес",
    "Неделя",
    "Артикул продавца",
    "Артикул WB",
    "Название",
    "Предмет",
    "Бренд",
    "Ярлыки",
    "Удаленный товар",
    "Рейтинг карточки",
    "Рейтинг по отзывам",
    DATE_COLUMN,
    "Показы",
    "CTR",
    "Переходы в карточку",
    "Положили в корзину",
    "Добавили в отложенные",
    "Заказали, шт",
    "Заказали ВБ клуб, шт",
    "Выкупили, шт",
    "Выкупили ВБ клуб, шт",
    "Отменили, шт",
    "Отменили ВБ клуб, шт",
    "Конверсия в корзину, %",
    "Конверсия в заказ, %",
    "Процент выкупа",
    "Процент выкупа ВБ клуб",
    "Заказали на сумму, ₽",
    "Заказали на сумму ВБ клуб, ₽",
    "Выкупили на сумму, ₽",
    "Выкупили на сумму ВБ клуб, ₽",
    "Отменили на сумму, ₽",
    "Отменили на сумму ВБ клуб, ₽",
];

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProductsRequest {
    selected_period: SelectedPeriod,
    nm_ids: Vec<i64>,
    limit: usize,
    offset: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SelectedPeriod {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Deserialize)]
struct ProductsResponse {
    data: ProductsData,
}

#[derive(Debug, Deserialize, Default)]
struct ProductsData {
    #[serde(default)]
    products: Vec<FunnelProduct>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FunnelProduct {
    pub product: ProductCard,
    pub statistic: ProductStatistic,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ProductCard {
    pub nm_id: Option<i64>,
    pub title: Option<String>,
    pub vendor_code: Option<String>,
    pub brand_name: Option<String>,
    pub subject_name: Option<String>,
    pub tags: Vec<ProductTag>,
    pub product_rating: Option<f64>,
    pub feedback_rating: Option<f64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProductTag {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProductStatistic {
    pub selected: PeriodStatistic,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PeriodStatistic {
    pub period: SelectedPeriod,
    #[serde(default)]
    pub open_count: Option<f64>,
    #[serde(default)]
    pub cart_count: Option<f64>,
    #[serde(default)]
    pub order_count: Option<f64>,
    #[serde(default)]
    pub order_sum: Option<f64>,
    #[serde(default)]
    pub buyout_count: Option<f64>,
    #[serde(default)]
    pub buyout_sum: Option<f64>,
    #[serde(default)]
    pub cancel_count: Option<f64>,
    #[serde(default)]
    pub cancel_sum: Option<f64>,
    #[serde(default)]
    pub add_to_wishlist: Option<f64>,
    #[serde(default)]
    pub wb_club: ClubStatistic,
    #[serde(default)]
    pub conversions: Conversions,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ClubStatistic {
    pub order_count: Option<f64>,
    pub order_sum: Option<f64>,
    pub buyout_count: Option<f64>,
    pub buyout_sum: Option<f64>,
    pub cancel_count: Option<f64>,
    pub cancel_sum: Option<f64>,
    pub buyout_percent: Option<f64>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Conversions {
    pub add_to_cart_percent: Option<f64>,
    pub cart_to_order_percent: Option<f64>,
    pub buyout_percent: Option<f64>,
}

/// All cards with statistics for `window`, requested page by page until a short page.
pub async fn fetch_products(
    api: &MarketplaceApi,
    window: PeriodWindow,
) -> Result<Vec<FunnelProduct>, RequestError> {
    let selected_period = SelectedPeriod {
        start: window.start().format(DATE_FORMAT).to_string(),
        end: window.end().format(DATE_FORMAT).to_string(),
    };
    let mut products = Vec::new();
    let mut offset = 0;
    loop {
        let request = ProductsRequest {
            selected_period: selected_period.clone(),
            nm_ids: Vec::new(),
            limit: PAGE_LIMIT,
            offset,
        };
        let response: ProductsResponse = api.post_json(PRODUCTS_PATH, &request).await?;
        let page = response.data.products.len();
        debug!(target: "reports.wb", offset, page, "funnel page");
        products.extend(response.data.products);
        if page < PAGE_LIMIT {
            break;
        }
        offset += page;
    }
    Ok(products)
}

fn funnel_row(item: &FunnelProduct) -> Row {
    let card = &item.product;
    let stats = &item.statistic.selected;
    let club = &stats.wb_club;
    let conv = &stats.conversions;
    let date = stats.period.start.as_str();
    let day = date
        .get(..10)
        .and_then(|prefix| NaiveDate::parse_from_str(prefix, DATE_FORMAT).ok());
    let tags = card
        .tags
        .iter()
        .map(|tag| tag.name.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    vec![
        Cell::from(day.map(|d| i64::from(d.year()))),
        Cell::from(day.map(|d| i64::from(d.month()))),
        Cell::from(day.map(|d| i64::from(week_of_year(d)))),
        Cell::from(card.vendor_code.clone()),
        Cell::from(card.nm_id),
        Cell::from(card.title.clone()),
        Cell::from(card.subject_name.clone()),
        Cell::from(card.brand_name.clone()),
        Cell::from(tags),
        // Deleted flag, views and CTR are not in this API.
        Cell::Null,
        Cell::from(card.product_rating),
        Cell::from(card.feedback_rating),
        Cell::from(date),
        Cell::Null,
        Cell::Null,
        Cell::from(stats.open_count),
        Cell::from(stats.cart_count),
        Cell::from(stats.add_to_wishlist),
        Cell::from(stats.order_count),
        Cell::from(club.order_count),
        Cell::from(stats.buyout_count),
        Cell::from(club.buyout_count),
        Cell::from(stats.cancel_count),
        Cell::from(club.cancel_count),
        Cell::from(conv.add_to_cart_percent),
        Cell::from(conv.cart_to_order_percent),
        Cell::from(conv.buyout_percent),
        Cell::from(club.buyout_percent),
        Cell::from(stats.order_sum),
        Cell::from(club.order_sum),
        Cell::from(stats.buyout_sum),
        Cell::from(club.buyout_sum),
        Cell::from(stats.cancel_sum),
        Cell::from(club.cancel_sum),
    ]
}

/// One row per card with `Store` in front; the sheet upsert covers the store's rows dated
/// inside the window.
pub fn build_output(
    products: &[FunnelProduct],
    store: &str,
    store_name: &str,
    window: PeriodWindow,
) -> ReportOutput {
    let table = Table::new(
        HEADERS.iter().map(|h| h.to_string()).collect(),
        products.iter().map(funnel_row).collect(),
    )
    .prepend_columns(&[(STORE_COLUMN, Cell::from(store_name))]);
    let date_index = HEADERS
        .iter()
        .position(|h| *h == DATE_COLUMN)
        .map_or(0, |idx| idx + 1);
    let key = KeyPredicate::default()
        .exact(0, store_name)
        .date_range(date_index, window.start(), window.end());
    ReportOutput {
        table,
        file_name: format!("wb-funnel-{}-{store}.csv", window.start().format(DATE_FORMAT)),
        sheet_name: format!("wb-{store}-funnel"),
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
    use serde_json::{Value, json};
    use std::sync::Arc;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, d).expect("date")
    }

    fn product(nm_id: i64, start: &str) -> Value {
        json!({
            "product": {
                "nmId": nm_id,
                "title": "Сковорода",
                "vendorCode": "PAN-28",
                "brandName": "Povar",
                "subjectId": 1,
                "subjectName": "Сковороды",
                "tags": [{"id": 1, "name": "Хит"}, {"id": 2, "name": "Новинка"}],
                "productRating": 4.8,
                "feedbackRating": 4.6,
                "stocks": {}
            },
            "statistic": {
                "selected": {
                    "period": {"start": start, "end": start},
                    "openCount": 120,
                    "cartCount": 14,
                    "orderCount": 5,
                    "orderSum": 7450.5,
                    "buyoutCount": 3,
                    "buyoutSum": 4470,
                    "cancelCount": 1,
                    "cancelSum": 1490,
                    "avgPrice": 1490,
                    "addToWishlist": 9,
                    "wbClub": {
                        "orderCount": 2,
                        "orderSum": 2980,
                        "buyoutSum": 1490,
                        "buyoutCount": 1,
                        "cancelSum": 0,
                        "cancelCount": 0,
                        "buyoutPercent": 50
                    },
                    "conversions": {
                        "addToCartPercent": 11.7,
                        "cartToOrderPercent": 35.7,
                        "buyoutPercent": 60
                    }
                }
            }
        })
    }

    fn api(client: Arc<RoutedClient>) -> MarketplaceApi {
        MarketplaceApi::new(
            client,
            Arc::new(RecordingSleeper::default()),
            RequestConfig::new("https://analytics.test", "wb"),
        )
    }

    fn parse(value: Value) -> FunnelProduct {
        serde_json::from_value(value).expect("product")
    }

    #[tokio::test]
    async fn fetch_requests_the_window_and_stops_on_short_page() {
        let client = Arc::new(RoutedClient::new());
        client.json(
            PRODUCTS_PATH,
            json!({"data": {"products": [product(1, "2026-02-08"), product(2, "2026-02-08")]}}),
        );

        let products = fetch_products(&api(client.clone()), PeriodWindow::single(day(8)))
            .await
            .expect("products");

        assert_eq!(products.len(), 2);
        let calls = client.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        let body: Value = serde_json::from_str(calls[0].body.as_deref().expect("body")).expect("json");
        assert_eq!(body["selectedPeriod"], json!({"start": "2026-02-08", "end": "2026-02-08"}));
        assert_eq!(body["nmIds"], json!([]));
        assert_eq!(body["limit"], json!(PAGE_LIMIT));
        assert_eq!(body["offset"], json!(0));
    }

    #[tokio::test]
    async fn missing_products_is_no_data() {
        let client = Arc::new(RoutedClient::new());
        client.json(PRODUCTS_PATH, json!({"data": {}}));

        let products = fetch_products(&api(client), PeriodWindow::single(day(8)))
            .await
            .expect("products");

        assert!(products.is_empty());
    }

    #[test]
    fn row_follows_the_cabinet_column_order() {
        let output = build_output(
            &[parse(product(77, "2026-02-08"))],
            "povar",
            "Povar",
            PeriodWindow::single(day(8)),
        );

        assert_eq!(output.table.header.len(), HEADERS.len() + 1);
        assert_eq!(output.table.header[0], "Store");
        let row = &output.table.rows[0];
        let at = |name: &str| &row[output.table.column_index(name).expect("column")];
        assert_eq!(row[0], Cell::from("Povar"));
        assert_eq!(*at("Год"), Cell::Number(2026.0));
        assert_eq!(*at("Мес"), Cell::Number(2.0));
        assert_eq!(*at("Неделя"), Cell::Number(6.0));
        assert_eq!(*at("Артикул WB"), Cell::Number(77.0));
        assert_eq!(*at("Ярлыки"), Cell::from("Хит, Новинка"));
        assert_eq!(*at("Удаленный товар"), Cell::Null);
        assert_eq!(*at("Дата"), Cell::from("2026-02-08"));
        assert_eq!(*at("Заказали ВБ клуб, шт"), Cell::Number(2.0));
        assert_eq!(*at("Конверсия в заказ, %"), Cell::Number(35.7));
        assert_eq!(*at("Заказали на сумму, ₽"), Cell::Number(7450.5));
        assert_eq!(*at("Отменили на сумму ВБ клуб, ₽"), Cell::Number(0.0));

        assert_eq!(output.file_name, "wb-funnel-2026-02-08-povar.csv");
        assert_eq!(output.sheet_name, "wb-povar-funnel");
    }

    #[test]
    fn key_selects_the_store_rows_of_the_window() {
        let output = build_output(&[], "povar", "Povar", PeriodWindow::single(day(8)));
        let date_index = output.table.column_index(DATE_COLUMN).expect("date column");
        let row = |store: &str, date: &str| {
            let mut row = vec![String::new(); output.table.header.len()];
            row[0] = store.to_string();
            row[date_index] = date.to_string();
            row
        };

        assert!(key_matches(&output.key, &row("Povar", "2026-02-08")));
        assert!(key_matches(&output.key, &row("Povar", "08.02.2026")));
        assert!(!key_matches(&output.key, &row("Povar", "2026-02-07")));
        assert!(!key_matches(&output.key, &row("Leeshop", "2026-02-08")));
    }
}
