//! Validated inputs for every fulfillment operation.

use chrono::{DateTime, Utc};
use common::{OrderId, ProductId, StockKey, WarehouseId};

use crate::error::{FulfillmentError, Result};

fn positive(quantity: u32) -> Result<()> {
    if quantity == 0 {
        return Err(FulfillmentError::validation("quantity must be greater than zero"));
    }
    Ok(())
}

/// Reserve one order line against a stock row.
#[derive(Debug, Clone)]
pub struct ReserveStock {
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub quantity: u32,
}

impl ReserveStock {
    pub fn new(
        order_id: OrderId,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        quantity: u32,
    ) -> Self {
        Self {
            order_id,
            product_id,
            warehouse_id,
            quantity,
        }
    }

    pub fn key(&self) -> StockKey {
        StockKey::new(self.product_id, self.warehouse_id)
    }

    pub fn validate(&self) -> Result<()> {
        positive(self.quantity)
    }
}

/// Ship every active reservation of an order.
#[derive(Debug, Clone)]
pub struct ShipOrder {
    pub order_id: OrderId,

    /// Defaults to the time the shipment is processed.
    pub ship_date: Option<DateTime<Utc>>,
}

impl ShipOrder {
    pub fn new(order_id: OrderId) -> Self {
        Self {
            order_id,
            ship_date: None,
        }
    }

    pub fn at(mut self, ship_date: DateTime<Utc>) -> Self {
        self.ship_date = Some(ship_date);
        self
    }
}

/// Convert pending backorders of one pair into reservations.
#[derive(Debug, Clone, Copy)]
pub struct DrainBackorders {
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
}

impl DrainBackorders {
    pub fn new(product_id: ProductId, warehouse_id: WarehouseId) -> Self {
        Self {
            product_id,
            warehouse_id,
        }
    }

    pub fn key(&self) -> StockKey {
        StockKey::new(self.product_id, self.warehouse_id)
    }
}

impl From<StockKey> for DrainBackorders {
    fn from(key: StockKey) -> Self {
        Self::new(key.product_id, key.warehouse_id)
    }
}

/// Move stock between two warehouses.
#[derive(Debug, Clone)]
pub struct TransferStock {
    pub product_id: ProductId,
    pub quantity: u32,
    pub source_warehouse_id: WarehouseId,
    pub destination_warehouse_id: WarehouseId,

    /// Drain the destination's backorder queue once the transfer lands.
    pub drain_backorders: bool,
}

impl TransferStock {
    pub fn new(
        product_id: ProductId,
        quantity: u32,
        source_warehouse_id: WarehouseId,
        destination_warehouse_id: WarehouseId,
    ) -> Self {
        Self {
            product_id,
            quantity,
            source_warehouse_id,
            destination_warehouse_id,
            drain_backorders: false,
        }
    }

    pub fn draining(mut self) -> Self {
        self.drain_backorders = true;
        self
    }

    pub fn source(&self) -> StockKey {
        StockKey::new(self.product_id, self.source_warehouse_id)
    }

    pub fn destination(&self) -> StockKey {
        StockKey::new(self.product_id, self.destination_warehouse_id)
    }

    pub fn validate(&self) -> Result<()> {
        positive(self.quantity)?;
        if self.source_warehouse_id == self.destination_warehouse_id {
            return Err(FulfillmentError::validation(
                "source and destination warehouse must differ",
            ));
        }
        Ok(())
    }
}

/// Book goods received at a warehouse.
#[derive(Debug, Clone)]
pub struct ReceiveStock {
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub quantity: u32,
    pub drain_backorders: bool,
}

impl ReceiveStock {
    pub fn new(product_id: ProductId, warehouse_id: WarehouseId, quantity: u32) -> Self {
        Self {
            product_id,
            warehouse_id,
            quantity,
            drain_backorders: false,
        }
    }

    pub fn draining(mut self) -> Self {
        self.drain_backorders = true;
        self
    }

    pub fn key(&self) -> StockKey {
        StockKey::new(self.product_id, self.warehouse_id)
    }

    pub fn validate(&self) -> Result<()> {
        positive(self.quantity)
    }
}

/// Cancel an order and release everything it holds.
#[derive(Debug, Clone, Copy)]
pub struct CancelOrder {
    pub order_id: OrderId,
}

impl CancelOrder {
    pub fn new(order_id: OrderId) -> Self {
        Self { order_id }
    }
}

/// Create a single-line order and reserve stock for it.
#[derive(Debug, Clone)]
pub struct PlaceOrder {
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub quantity: u32,
}

impl PlaceOrder {
    /// Creates a PlaceOrder command with a generated order ID.
    pub fn new(product_id: ProductId, warehouse_id: WarehouseId, quantity: u32) -> Self {
        Self {
            order_id: OrderId::new(),
            product_id,
            warehouse_id,
            quantity,
        }
    }

    pub fn validate(&self) -> Result<()> {
        positive(self.quantity)
    }

    pub fn reserve(&self) -> ReserveStock {
        ReserveStock::new(
            self.order_id,
            self.product_id,
            self.warehouse_id,
            self.quantity,
        )
    }
}
