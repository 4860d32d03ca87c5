use chrono::{FixedOffset, NaiveDate, NaiveDateTime, Offset, Timelike, Utc};

/// Source of "now" in institution local time.
#[derive(Debug, Clone)]
pub enum Clock {
    System { offset: FixedOffset },
    Fixed(NaiveDateTime),
}

impl Clock {
    pub fn system(utc_offset_hours: i32) -> Self {
        let offset = FixedOffset::east_opt(utc_offset_hours * 3600).unwrap_or_else(|| {
            tracing::warn!(utc_offset_hours, "invalid UTC offset, falling back to UTC");
            Utc.fix()
        });
        Clock::System { offset }
    }

    pub fn now(&self) -> NaiveDateTime {
        match self {
            Clock::System { offset } => {
                let t = Utc::now().with_timezone(offset).naive_local();
                t.with_nanosecond(0).unwrap_or(t)
            }
            Clock::Fixed(t) => *t,
        }
    }

    pub fn today(&self) -> NaiveDate {
        self.now().date()
    }
}

pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let t = text.trim();
    NaiveDateTime::parse_from_str(t, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(t, "%Y-%m-%d %H:%M:%S"))
        .ok()
}
