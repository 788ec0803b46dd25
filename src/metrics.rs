use crate::dataset::{Ratio, SalesRecord};

/// Populate `margin` and `profit_per_unit` from the base columns. Idempotent.
pub fn derive_metrics(records: &mut [SalesRecord]) {
    for record in records.iter_mut() {
        record.margin = margin(record);
        record.profit_per_unit = profit_per_unit(record);
    }
}

pub fn margin(record: &SalesRecord) -> Ratio {
    Ratio::divide(record.gross_profit, record.sales)
}

pub fn profit_per_unit(record: &SalesRecord) -> Ratio {
    Ratio::divide(record.gross_profit, record.units)
}
