//! Request DTOs and their mapping onto ledger commands.
//!
//! Quantities accept a decimal string (`"12.5"`) or a JSON number; items accept
//! a numeric id or a catalog code.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value as JsonValue;

use avicola_core::{DomainError, FarmId, ItemId};
use avicola_infra::{
    ItemRef, MovementFilter, Pagination, PostAdjust, PostEntry, PostExit, PostTransfer,
    StockCount, StockCountLine,
};
use avicola_inventory::{MovementDetails, MovementType};

use crate::context::RequestContext;

/// Free-form fields shared by every posting request.
#[derive(Debug, Default, Deserialize)]
pub struct DetailsRequest {
    pub reference: Option<String>,
    pub reason: Option<String>,
    pub metadata: Option<JsonValue>,
}

impl DetailsRequest {
    /// Details are validated by the ledger; this only attaches the caller.
    fn into_details(self, ctx: &RequestContext) -> MovementDetails {
        MovementDetails {
            reference: self.reference,
            reason: self.reason,
            metadata: self.metadata,
            responsible_party: ctx.responsible_party().map(str::to_string),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PostQuantityRequest {
    pub item: ItemRef,
    pub quantity: Decimal,
    pub unit: Option<String>,
    #[serde(flatten)]
    pub details: DetailsRequest,
}

impl PostQuantityRequest {
    pub fn into_entry(self, farm_id: FarmId, ctx: &RequestContext) -> PostEntry {
        PostEntry {
            farm_id,
            item: self.item,
            quantity: self.quantity,
            unit: self.unit,
            details: self.details.into_details(ctx),
        }
    }

    pub fn into_exit(self, farm_id: FarmId, ctx: &RequestContext) -> PostExit {
        PostExit {
            farm_id,
            item: self.item,
            quantity: self.quantity,
            unit: self.unit,
            details: self.details.into_details(ctx),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PostAdjustRequest {
    pub item: ItemRef,
    /// Signed change: positive raises the balance, negative lowers it.
    pub delta: Decimal,
    pub unit: Option<String>,
    #[serde(flatten)]
    pub details: DetailsRequest,
}

impl PostAdjustRequest {
    pub fn into_command(self, farm_id: FarmId, ctx: &RequestContext) -> PostAdjust {
        PostAdjust {
            farm_id,
            item: self.item,
            delta: self.delta,
            unit: self.unit,
            details: self.details.into_details(ctx),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PostTransferRequest {
    pub to_farm_id: i64,
    pub item: ItemRef,
    pub quantity: Decimal,
    pub unit: Option<String>,
    #[serde(flatten)]
    pub details: DetailsRequest,
}

impl PostTransferRequest {
    pub fn into_command(self, from_farm_id: FarmId, ctx: &RequestContext) -> PostTransfer {
        PostTransfer {
            from_farm_id,
            to_farm_id: FarmId::new(self.to_farm_id),
            item: self.item,
            quantity: self.quantity,
            unit: self.unit,
            details: self.details.into_details(ctx),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StockCountLineRequest {
    pub item: ItemRef,
    pub counted: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct StockCountRequest {
    pub lines: Vec<StockCountLineRequest>,
    #[serde(flatten)]
    pub details: DetailsRequest,
}

impl StockCountRequest {
    pub fn into_command(self, farm_id: FarmId, ctx: &RequestContext) -> StockCount {
        StockCount {
            farm_id,
            lines: self
                .lines
                .into_iter()
                .map(|l| StockCountLine {
                    item: l.item,
                    counted: l.counted,
                })
                .collect(),
            details: self.details.into_details(ctx),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct MovementListQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub item_id: Option<i64>,
    pub movement_type: Option<String>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl MovementListQuery {
    pub fn into_filter(self) -> Result<(MovementFilter, Pagination), DomainError> {
        let movement_type = self
            .movement_type
            .as_deref()
            .map(str::parse::<MovementType>)
            .transpose()?;
        let filter = MovementFilter {
            from: self.from,
            to: self.to,
            item_id: self.item_id.map(ItemId::new),
            movement_type,
        };
        Ok((filter, Pagination::new(self.page, self.page_size)))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct KardexQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}
