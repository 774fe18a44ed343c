use tracing::debug;

use crate::inventory::{Inventory, Record};

/// Search criteria for [`Inventory::search`].
///
/// Every criterion is optional; the ones that are set must all match.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Query {
    /// Matches rows whose name contains this text, ignoring case.
    pub name: Option<String>,
    /// Matches rows with at least this quantity.
    pub quantity: Option<i64>,
    /// Matches rows with a unit price of at least this much.
    pub unit_price: Option<f64>,
}

impl Query {
    /// Reports whether `record` satisfies every criterion in the query.
    ///
    /// A missing name never matches a name criterion, and a missing quantity
    /// or unit price never matches a threshold. Criteria that aren't set
    /// don't look at the corresponding value at all, so a row with no name
    /// still matches a query with only numeric thresholds.
    ///
    /// # Examples
    ///
    /// ```
    /// # use stock::{Inventory, Query};
    /// let mut inventory =
    ///     Inventory::read_csv_from("nom,quantite\nPC portable,2\n".as_bytes(), "it").unwrap();
    /// inventory.coerce_numeric();
    /// let record = &inventory.records()[0];
    /// let query = Query { name: Some("pc".into()), quantity: Some(2), ..Query::default() };
    /// assert!(query.matches(record));
    /// ```
    #[must_use]
    pub fn matches(&self, record: &Record) -> bool {
        self.matches_name(record) && self.matches_quantity(record) && self.matches_price(record)
    }

    fn matches_name(&self, record: &Record) -> bool {
        match self.name.as_deref() {
            None | Some("") => true,
            Some(needle) => record
                .name()
                .is_some_and(|name| name.to_lowercase().contains(&needle.to_lowercase())),
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn matches_quantity(&self, record: &Record) -> bool {
        self.quantity.map_or(true, |min| {
            record
                .quantity()
                .is_some_and(|quantity| quantity >= min as f64)
        })
    }

    fn matches_price(&self, record: &Record) -> bool {
        self.unit_price
            .map_or(true, |min| record.unit_price().is_some_and(|price| price >= min))
    }
}

impl Inventory {
    /// Returns the rows matching `query`, in their original order.
    ///
    /// The result has the same columns as `self`. An empty inventory gives an
    /// empty result without looking at the query.
    #[must_use]
    pub fn search(&self, query: &Query) -> Inventory {
        if self.is_empty() {
            return self.clone();
        }
        let records: Vec<Record> = self
            .records()
            .iter()
            .filter(|r| query.matches(r))
            .cloned()
            .collect();
        debug!(?query, matched = records.len(), of = self.len(), "searched inventory");
        self.with_records(records)
    }
}
