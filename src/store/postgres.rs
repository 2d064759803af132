//! PostgreSQL backend.
//!
//! Tables are created by `migrations/`. Queries are checked at runtime so the
//! crate builds without a live database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::HashMap;
use std::str::FromStr;
use uuid::Uuid;

use super::{Catalog, CatalogItem, CartRepository, OrderRepository, StoreError, StoreResult};
use crate::domain::aggregates::{
    Address, Cart, CartLine, CartOwner, CartStatus, Order, OrderLine, OrderParts, OrderStatus, PaymentMethod,
    PaymentStatus,
};
use crate::domain::value_objects::{
    CartId, CustomerId, LineId, Money, OrderId, OrderLineId, OrderNumber, ProductId, Quantity, VariantId,
};
use crate::identity::{Identity, IdentityResolver, Role};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self { Self { pool } }

    pub fn pool(&self) -> &PgPool { &self.pool }

    async fn load_cart(&self, row: CartRow) -> StoreResult<Cart> {
        let lines = sqlx::query_as::<_, CartLineRow>(
            "SELECT id, product_id, variant_id, quantity, unit_price, display_name, image_ref \
             FROM cart_line WHERE cart_id = $1 ORDER BY created_at, id",
        )
        .bind(row.id)
        .fetch_all(&self.pool)
        .await?;
        row.into_cart(lines)
    }

    async fn attach_lines(&self, rows: Vec<OrderRow>) -> StoreResult<Vec<Order>> {
        if rows.is_empty() {
            return Ok(vec![]);
        }
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let line_rows = sqlx::query_as::<_, OrderLineRow>(
            "SELECT id, order_id, product_id, variant_id, display_name, quantity, unit_price, total_price \
             FROM order_line WHERE order_id = ANY($1) ORDER BY position",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_order: HashMap<Uuid, Vec<OrderLine>> = HashMap::new();
        for line in line_rows {
            let order_id = line.order_id;
            by_order.entry(order_id).or_default().push(line.into_line()?);
        }
        rows.into_iter()
            .map(|row| {
                let lines = by_order.remove(&row.id).unwrap_or_default();
                row.into_order(lines)
            })
            .collect()
    }
}

fn conflict_or_database(e: sqlx::Error, what: &str) -> StoreError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.is_unique_violation() {
            return StoreError::Conflict(format!("{what} already exists"));
        }
    }
    StoreError::Database(e)
}

/// Order header inserts can collide on the order number or on the cart.
fn order_insert_error(e: sqlx::Error, cart_id: CartId) -> StoreError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.is_unique_violation() && db_err.constraint() == Some("orders_one_per_cart") {
            return StoreError::CartAlreadyOrdered(cart_id);
        }
    }
    conflict_or_database(e, "order number")
}

fn quantity_column(q: Quantity) -> StoreResult<i32> {
    i32::try_from(q.value()).map_err(|_| StoreError::Conflict(format!("quantity {} out of range", q.value())))
}

fn parse_column<T: FromStr<Err = String>>(value: &str) -> StoreResult<T> {
    value.parse().map_err(StoreError::DataCorruption)
}

#[derive(sqlx::FromRow)]
struct CartRow {
    id: Uuid,
    owner_ref: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl CartRow {
    fn into_cart(self, lines: Vec<CartLineRow>) -> StoreResult<Cart> {
        let owner = CartOwner::parse_owner_ref(&self.owner_ref)
            .ok_or_else(|| StoreError::DataCorruption(format!("invalid cart owner '{}'", self.owner_ref)))?;
        let status: CartStatus = parse_column(&self.status)?;
        let lines = lines.into_iter().map(CartLineRow::into_line).collect::<StoreResult<Vec<_>>>()?;
        Ok(Cart::from_parts(CartId::from_uuid(self.id), owner, status, lines, self.created_at, self.updated_at))
    }
}

#[derive(sqlx::FromRow)]
struct CartLineRow {
    id: Uuid,
    product_id: Uuid,
    variant_id: Option<Uuid>,
    quantity: i32,
    unit_price: Decimal,
    display_name: String,
    image_ref: Option<String>,
}

impl CartLineRow {
    fn into_line(self) -> StoreResult<CartLine> {
        let quantity = Quantity::new(i64::from(self.quantity))
            .ok_or_else(|| StoreError::DataCorruption(format!("cart line {} has quantity {}", self.id, self.quantity)))?;
        Ok(CartLine {
            id: LineId::from_uuid(self.id),
            product_id: ProductId::from_uuid(self.product_id),
            variant_id: self.variant_id.map(VariantId::from_uuid),
            quantity,
            unit_price: Money::new(self.unit_price),
            display_name: self.display_name,
            image_ref: self.image_ref,
        })
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    order_number: String,
    customer_id: Uuid,
    cart_id: Uuid,
    status: String,
    payment_status: String,
    payment_method: String,
    subtotal: Decimal,
    shipping_cost: Decimal,
    discount_amount: Decimal,
    total_amount: Decimal,
    shipping_address_json: Json<Address>,
    billing_address_json: Option<Json<Address>>,
    notes: Option<String>,
    tracking_number: Option<String>,
    shipped_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

const ORDER_COLUMNS: &str = "id, order_number, customer_id, cart_id, status, payment_status, payment_method, \
    subtotal, shipping_cost, discount_amount, total_amount, shipping_address_json, billing_address_json, notes, \
    tracking_number, shipped_at, delivered_at, created_at, updated_at";

impl OrderRow {
    fn into_order(self, lines: Vec<OrderLine>) -> StoreResult<Order> {
        Ok(Order::restore(OrderParts {
            id: OrderId::from_uuid(self.id),
            order_number: OrderNumber::new(self.order_number),
            customer_id: CustomerId::from_uuid(self.customer_id),
            cart_id: CartId::from_uuid(self.cart_id),
            status: parse_column::<OrderStatus>(&self.status)?,
            payment_status: parse_column::<PaymentStatus>(&self.payment_status)?,
            payment_method: parse_column::<PaymentMethod>(&self.payment_method)?,
            shipping_address: self.shipping_address_json.0,
            billing_address: self.billing_address_json.map(|j| j.0),
            notes: self.notes,
            subtotal: Money::new(self.subtotal),
            shipping_cost: Money::new(self.shipping_cost),
            discount_amount: Money::new(self.discount_amount),
            total_amount: Money::new(self.total_amount),
            lines,
            tracking_number: self.tracking_number,
            shipped_at: self.shipped_at,
            delivered_at: self.delivered_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }))
    }
}

#[derive(sqlx::FromRow)]
struct OrderLineRow {
    id: Uuid,
    order_id: Uuid,
    product_id: Uuid,
    variant_id: Option<Uuid>,
    display_name: String,
    quantity: i32,
    unit_price: Decimal,
    total_price: Decimal,
}

impl OrderLineRow {
    fn into_line(self) -> StoreResult<OrderLine> {
        let quantity = Quantity::new(i64::from(self.quantity))
            .ok_or_else(|| StoreError::DataCorruption(format!("order line {} has quantity {}", self.id, self.quantity)))?;
        Ok(OrderLine {
            id: OrderLineId::from_uuid(self.id),
            product_id: ProductId::from_uuid(self.product_id),
            variant_id: self.variant_id.map(VariantId::from_uuid),
            display_name: self.display_name,
            quantity,
            unit_price: Money::new(self.unit_price),
            total_price: Money::new(self.total_price),
        })
    }
}

#[async_trait]
impl CartRepository for PgStore {
    async fn active_cart(&self, customer_id: CustomerId) -> StoreResult<Option<Cart>> {
        let row = sqlx::query_as::<_, CartRow>(
            "SELECT id, owner_ref, status, created_at, updated_at FROM cart WHERE owner_ref = $1 AND status = 'active'",
        )
        .bind(CartOwner::Customer(customer_id).owner_ref())
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => Ok(Some(self.load_cart(row).await?)),
            None => Ok(None),
        }
    }

    async fn open_cart(&self, customer_id: CustomerId) -> StoreResult<Cart> {
        sqlx::query(
            "INSERT INTO cart (id, owner_ref, status) VALUES ($1, $2, 'active') \
             ON CONFLICT (owner_ref) WHERE status = 'active' DO NOTHING",
        )
        .bind(CartId::generate().as_uuid())
        .bind(CartOwner::Customer(customer_id).owner_ref())
        .execute(&self.pool)
        .await?;
        self.active_cart(customer_id)
            .await?
            .ok_or_else(|| StoreError::Conflict(format!("active cart for {customer_id} vanished after creation")))
    }

    async fn merge_lines(&self, cart_id: CartId, lines: &[CartLine]) -> StoreResult<()> {
        let mut tx: Transaction<'_, Postgres> = self.pool.begin().await?;
        let active: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM cart WHERE id = $1 AND status = 'active' FOR UPDATE")
            .bind(cart_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await?;
        if active.is_none() {
            return Err(StoreError::Conflict(format!("cart {cart_id} is not active")));
        }
        for line in lines {
            sqlx::query(
                "INSERT INTO cart_line (id, cart_id, product_id, variant_id, quantity, unit_price, display_name, image_ref) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
                 ON CONFLICT (cart_id, product_id, variant_id) \
                 DO UPDATE SET quantity = LEAST(cart_line.quantity::BIGINT + EXCLUDED.quantity, 2147483647)::INTEGER, updated_at = NOW()",
            )
            .bind(line.id.as_uuid())
            .bind(cart_id.as_uuid())
            .bind(line.product_id.as_uuid())
            .bind(line.variant_id.map(|v| v.as_uuid()))
            .bind(quantity_column(line.quantity)?)
            .bind(line.unit_price.amount())
            .bind(&line.display_name)
            .bind(&line.image_ref)
            .execute(&mut *tx)
            .await?;
        }
        sqlx::query("UPDATE cart SET updated_at = NOW() WHERE id = $1")
            .bind(cart_id.as_uuid())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn set_line_quantity(&self, cart_id: CartId, line_id: LineId, quantity: Quantity) -> StoreResult<()> {
        sqlx::query(
            "UPDATE cart_line SET quantity = $3, updated_at = NOW() \
             WHERE id = $2 AND cart_id = $1 AND EXISTS (SELECT 1 FROM cart WHERE id = $1 AND status = 'active')",
        )
        .bind(cart_id.as_uuid())
        .bind(line_id.as_uuid())
        .bind(quantity_column(quantity)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_line(&self, cart_id: CartId, line_id: LineId) -> StoreResult<()> {
        sqlx::query(
            "DELETE FROM cart_line \
             WHERE id = $2 AND cart_id = $1 AND EXISTS (SELECT 1 FROM cart WHERE id = $1 AND status = 'active')",
        )
        .bind(cart_id.as_uuid())
        .bind(line_id.as_uuid())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_all_lines(&self, cart_id: CartId) -> StoreResult<()> {
        sqlx::query(
            "DELETE FROM cart_line WHERE cart_id = $1 AND EXISTS (SELECT 1 FROM cart WHERE id = $1 AND status = 'active')",
        )
        .bind(cart_id.as_uuid())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_converted(&self, cart_id: CartId) -> StoreResult<()> {
        let result = sqlx::query("UPDATE cart SET status = 'converted', updated_at = NOW() WHERE id = $1 AND status = 'active'")
            .bind(cart_id.as_uuid())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!("cart {cart_id} is not active")));
        }
        Ok(())
    }
}

#[async_trait]
impl OrderRepository for PgStore {
    async fn insert_order(&self, order: &Order) -> StoreResult<()> {
        // Dropping the transaction without commit rolls everything back.
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO orders (id, order_number, customer_id, cart_id, status, payment_status, payment_method, \
             subtotal, shipping_cost, discount_amount, total_amount, shipping_address_json, billing_address_json, \
             notes, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)",
        )
        .bind(order.id().as_uuid())
        .bind(order.order_number().as_str())
        .bind(order.customer_id().as_uuid())
        .bind(order.cart_id().as_uuid())
        .bind(order.status().as_str())
        .bind(order.payment_status().as_str())
        .bind(order.payment_method().as_str())
        .bind(order.subtotal().amount())
        .bind(order.shipping_cost().amount())
        .bind(order.discount_amount().amount())
        .bind(order.total_amount().amount())
        .bind(Json(order.shipping_address()))
        .bind(order.billing_address().map(Json))
        .bind(order.notes())
        .bind(order.created_at())
        .bind(order.updated_at())
        .execute(&mut *tx)
        .await
        .map_err(|e| order_insert_error(e, order.cart_id()))?;

        for (position, line) in order.lines().iter().enumerate() {
            sqlx::query(
                "INSERT INTO order_line (id, order_id, position, product_id, variant_id, display_name, quantity, \
                 unit_price, total_price) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            )
            .bind(line.id.as_uuid())
            .bind(order.id().as_uuid())
            .bind(i32::try_from(position).unwrap_or(i32::MAX))
            .bind(line.product_id.as_uuid())
            .bind(line.variant_id.map(|v| v.as_uuid()))
            .bind(&line.display_name)
            .bind(quantity_column(line.quantity)?)
            .bind(line.unit_price.amount())
            .bind(line.total_price.amount())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn find_order(&self, id: OrderId) -> StoreResult<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        Ok(self.attach_lines(row.into_iter().collect()).await?.pop())
    }

    async fn orders_for_customer(&self, customer_id: CustomerId) -> StoreResult<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE customer_id = $1 ORDER BY created_at DESC, id DESC"
        ))
        .bind(customer_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        self.attach_lines(rows).await
    }

    async fn list_orders(&self, limit: u32, offset: u32) -> StoreResult<(Vec<Order>, i64)> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders ORDER BY created_at DESC, id DESC LIMIT $1 OFFSET $2"
        ))
        .bind(i64::from(limit))
        .bind(i64::from(offset))
        .fetch_all(&self.pool)
        .await?;
        let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM orders").fetch_one(&self.pool).await?;
        Ok((self.attach_lines(rows).await?, total.0))
    }

    async fn save_order_update(&self, order: &Order, expected: OrderStatus) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE orders SET status = $2, payment_status = $3, tracking_number = $4, shipped_at = $5, \
             delivered_at = $6, updated_at = $7 WHERE id = $1 AND status = $8",
        )
        .bind(order.id().as_uuid())
        .bind(order.status().as_str())
        .bind(order.payment_status().as_str())
        .bind(order.tracking_number())
        .bind(order.shipped_at())
        .bind(order.delivered_at())
        .bind(order.updated_at())
        .bind(expected.as_str())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!("order {} is no longer {expected}", order.id())));
        }
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct CatalogRow {
    product_id: Uuid,
    variant_id: Option<Uuid>,
    name: String,
    image_url: Option<String>,
    price: Decimal,
}

impl From<CatalogRow> for CatalogItem {
    fn from(r: CatalogRow) -> Self {
        Self {
            product_id: ProductId::from_uuid(r.product_id),
            variant_id: r.variant_id.map(VariantId::from_uuid),
            name: r.name,
            image_ref: r.image_url,
            price: Money::new(r.price),
        }
    }
}

#[async_trait]
impl Catalog for PgStore {
    async fn price_of(&self, product_id: ProductId, variant_id: Option<VariantId>) -> StoreResult<Option<CatalogItem>> {
        let row = sqlx::query_as::<_, CatalogRow>(
            "SELECT p.id AS product_id, v.id AS variant_id, \
                    CASE WHEN v.id IS NULL THEN p.name ELSE p.name || ' / ' || v.name END AS name, \
                    p.image_url, COALESCE(v.price, p.price) AS price \
             FROM product p LEFT JOIN product_variant v ON v.product_id = p.id AND v.id = $2 \
             WHERE p.id = $1 AND p.status = 'active'",
        )
        .bind(product_id.as_uuid())
        .bind(variant_id.map(|v| v.as_uuid()))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.filter(|r| variant_id.is_none() || r.variant_id.is_some()).map(CatalogItem::from))
    }

    async fn list_products(&self, limit: u32, offset: u32) -> StoreResult<Vec<CatalogItem>> {
        let rows = sqlx::query_as::<_, CatalogRow>(
            "SELECT id AS product_id, NULL::uuid AS variant_id, name, image_url, price \
             FROM product WHERE status = 'active' ORDER BY name, id LIMIT $1 OFFSET $2",
        )
        .bind(i64::from(limit))
        .bind(i64::from(offset))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(CatalogItem::from).collect())
    }
}

/// Reads sessions issued by the identity service.
#[async_trait]
impl IdentityResolver for PgStore {
    async fn resolve(&self, credential: &str) -> StoreResult<Option<Identity>> {
        let row: Option<(Uuid, String)> = sqlx::query_as(
            "SELECT customer_id, role FROM customer_session WHERE token = $1 AND expires_at > NOW()",
        )
        .bind(credential)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|(customer_id, role)| -> StoreResult<Identity> {
            let role: Role = parse_column(&role)?;
            Ok(Identity { customer_id: Some(CustomerId::from_uuid(customer_id)), role: Some(role) })
        })
        .transpose()
    }
}
