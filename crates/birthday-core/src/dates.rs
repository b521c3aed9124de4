use chrono::{Datelike, NaiveDate};

/// Days from `today` until the next anniversary of `birth`'s month and day.
///
/// If this year's anniversary is strictly before `today`, next year's is used;
/// `0` means the anniversary is today. A February 29 birthday falls on
/// February 28 in non-leap years.
pub fn days_until_birthday(birth: NaiveDate, today: NaiveDate) -> u32 {
    let this_year = anniversary_in(birth, today.year());

    let next = if this_year < today {
        anniversary_in(birth, today.year() + 1)
    } else {
        this_year
    };

    // `next >= today` holds on both branches.
    (next - today).num_days() as u32
}

/// The anniversary of `birth` in `year`.
fn anniversary_in(birth: NaiveDate, year: i32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, birth.month(), birth.day())
        .or_else(|| NaiveDate::from_ymd_opt(year, 2, 28))
        .unwrap_or(birth)
}
