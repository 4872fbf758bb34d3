use chrono::{Local, NaiveDate};

/// 时间来源：计时、完成日期和创建日期都从这里取
pub trait Clock {
    /// Epoch milliseconds.
    fn now_millis(&self) -> i64;
    /// Local calendar day.
    fn today(&self) -> NaiveDate;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Local::now().timestamp_millis()
    }

    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}
