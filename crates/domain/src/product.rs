//! Product snapshot supplied by the catalog.

use common::ProductId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::money::Money;

/// Errors raised when constructing a product snapshot.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProductError {
    /// A sale price must undercut the list price.
    #[error("Sale price {sale} is not below list price {list}")]
    SalePriceNotBelowList { list: Money, sale: Money },
}

/// A point-in-time view of a catalog product (an album).
///
/// The catalog service owns the live record; the order workflow only
/// ever reads snapshots, capturing prices into cart lines and
/// denormalizing display fields into order lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSnapshot {
    pub id: ProductId,
    pub slug: String,
    pub title: String,
    pub artist: String,
    /// Media format, e.g. "LP", "2xLP", "CD".
    pub format: String,
    pub cover_image: Option<String>,
    pub list_price: Money,
    pub sale_price: Option<Money>,
}

impl ProductSnapshot {
    /// Creates a snapshot, validating that any sale price is strictly
    /// below the list price.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: ProductId,
        slug: impl Into<String>,
        title: impl Into<String>,
        artist: impl Into<String>,
        format: impl Into<String>,
        cover_image: Option<String>,
        list_price: Money,
        sale_price: Option<Money>,
    ) -> Result<Self, ProductError> {
        if let Some(sale) = sale_price
            && sale >= list_price
        {
            return Err(ProductError::SalePriceNotBelowList {
                list: list_price,
                sale,
            });
        }

        Ok(Self {
            id,
            slug: slug.into(),
            title: title.into(),
            artist: artist.into(),
            format: format.into(),
            cover_image,
            list_price,
            sale_price,
        })
    }

    /// Returns the price a buyer pays right now: the sale price when
    /// present, otherwise the list price.
    pub fn effective_price(&self) -> Money {
        match self.sale_price {
            Some(sale) if sale < self.list_price => sale,
            _ => self.list_price,
        }
    }
}
