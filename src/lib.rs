#![doc = include_str!("../README.md")]
mod cell;
mod inventory;
mod report;
mod search;

pub use cell::{parse_or_missing, Cell, NA_VALUES};
pub use inventory::{
    Consolidation, Inventory, Record, SkippedFile, CATEGORY_COLUMN, NAME_COLUMNS,
    QUANTITY_COLUMNS, UNIT_PRICE_COLUMNS,
};
pub use report::{
    csv_pair_paths, generate_report, CategorySummary, GlobalSummary, Metric, Report,
    CATEGORY_SHEET, GLOBAL_SHEET,
};
pub use search::Query;
