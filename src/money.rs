use rust_decimal::{Decimal, RoundingStrategy};
use rusqlite::types::Type;
use rusqlite::{Row, RowIndex};
use std::str::FromStr;

/// Two fractional digits, half away from zero.
pub fn round2(d: Decimal) -> Decimal {
    let mut r = d.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    r.rescale(2);
    r
}

pub fn to_sql(d: Decimal) -> String {
    round2(d).to_string()
}

pub fn opt_to_sql(d: Option<Decimal>) -> Option<String> {
    d.map(to_sql)
}

pub fn parse(text: &str) -> Option<Decimal> {
    Decimal::from_str(text.trim()).ok()
}

pub fn col<I: RowIndex>(row: &Row<'_>, idx: I) -> rusqlite::Result<Decimal> {
    let text: String = row.get(idx)?;
    Decimal::from_str(text.trim())
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))
}

pub fn opt_col<I: RowIndex>(row: &Row<'_>, idx: I) -> rusqlite::Result<Option<Decimal>> {
    let text: Option<String> = row.get(idx)?;
    match text {
        None => Ok(None),
        Some(t) => Decimal::from_str(t.trim())
            .map(Some)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e))),
    }
}

pub fn sum<I: IntoIterator<Item = Decimal>>(values: I) -> Decimal {
    round2(values.into_iter().fold(Decimal::ZERO, |acc, v| acc + v))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round2_uses_half_away_from_zero() {
        assert_eq!(round2(Decimal::new(12345, 3)).to_string(), "12.35");
        assert_eq!(round2(Decimal::new(-12345, 3)).to_string(), "-12.35");
        assert_eq!(round2(Decimal::from(50000)).to_string(), "50000.00");
    }

    #[test]
    fn column_roundtrip_keeps_scale() {
        let conn = rusqlite::Connection::open_in_memory().expect("open");
        conn.execute("CREATE TABLE m(v TEXT, o TEXT)", []).expect("create");
        conn.execute(
            "INSERT INTO m(v, o) VALUES(?, NULL)",
            [to_sql(Decimal::new(2500000, 2))],
        )
        .expect("insert");
        let (v, o) = conn
            .query_row("SELECT v, o FROM m", [], |r| Ok((col(r, 0)?, opt_col(r, 1)?)))
            .expect("select");
        assert_eq!(v, Decimal::new(2500000, 2));
        assert_eq!(o, None);
    }
}
