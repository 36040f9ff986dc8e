//! Code for reading and validating the hourly time series for one representative year.
//!
//! The time series is produced by an upstream preprocessing pipeline, which normalises timestamps
//! and fills any gaps. Here we only check that what we have been given is complete and sensible;
//! nothing is silently corrected.
use super::input_err_msg;
use crate::units::{Dimensionless, Energy, Hours, MoneyPerEnergy, Power};
use anyhow::{Context, Result, ensure};
use chrono::{Datelike, NaiveDate, NaiveDateTime, TimeDelta, Timelike};
use serde::Deserialize;
use std::error::Error;
use std::fmt;
use std::path::Path;

/// The number of hourly timesteps in a (non-leap) year
pub const HOURS_PER_YEAR: usize = 8760;

/// The duration of a single timestep
pub const TIMESTEP: Hours = Hours(1.0);

/// The name of the time series file in a model directory
pub const TIME_SERIES_FILE_NAME: &str = "timeseries.csv";

/// The format used for timestamps in the input file
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Conversion factor from the kWh used in the input file
pub const KWH_PER_MWH: f64 = 1000.0;

/// The columns which must be present in the time series file
pub const REQUIRED_COLUMNS: [&str; 6] = [
    "timestamp",
    "consumption_kwh",
    "wind_capacity_factor",
    "solar_capacity_factor",
    "hydro_inflow_kwh",
    "grid_price_eur_per_mwh",
];

/// A row of the time series file, as read
#[derive(Debug, Deserialize)]
struct TimeSeriesRaw {
    timestamp: Option<String>,
    consumption_kwh: Option<f64>,
    wind_capacity_factor: Option<f64>,
    solar_capacity_factor: Option<f64>,
    hydro_inflow_kwh: Option<f64>,
    grid_price_eur_per_mwh: Option<f64>,
}

/// Indicates that the input time series is incomplete or contains invalid values.
///
/// Row numbers are one-based and do not count the header.
#[derive(Debug, Clone, PartialEq)]
pub enum MalformedInputError {
    /// Required columns are absent from the file
    MissingColumns(Vec<String>),
    /// The table does not have one row per hour of the year
    WrongRowCount {
        /// Required number of rows
        expected: usize,
        /// Number of rows found
        found: usize,
    },
    /// A cell is empty
    MissingValue {
        /// Row number
        row: usize,
        /// Column name
        column: &'static str,
    },
    /// A timestamp could not be parsed
    InvalidTimestamp {
        /// Row number
        row: usize,
        /// The offending text
        value: String,
    },
    /// The same timestamp appears twice in a row
    DuplicateTimestamp {
        /// Row number of the repeat
        row: usize,
        /// The repeated timestamp
        timestamp: NaiveDateTime,
    },
    /// Consecutive timestamps are not exactly one hour apart
    IrregularTimestep {
        /// Row number
        row: usize,
        /// The offending timestamp
        timestamp: NaiveDateTime,
    },
    /// The series does not start at midnight on 1 January of a non-leap year
    NotCalendarYear {
        /// The first timestamp of the series
        first: NaiveDateTime,
    },
    /// A value lies outside the range permitted for its column
    OutOfRange {
        /// Row number
        row: usize,
        /// Column name
        column: &'static str,
        /// The offending value
        value: f64,
        /// Description of the permitted range
        expected: &'static str,
    },
    /// A per-timestep series does not have one entry per timestep
    LengthMismatch {
        /// Name of the series
        series: String,
        /// Required length
        expected: usize,
        /// Actual length
        found: usize,
    },
}

impl fmt::Display for MalformedInputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingColumns(columns) => {
                write!(f, "Missing required columns: {}", columns.join(", "))
            }
            Self::WrongRowCount { expected, found } => {
                write!(f, "Expected {expected} hourly rows, found {found}")
            }
            Self::MissingValue { row, column } => {
                write!(f, "Missing value for {column} in row {row}")
            }
            Self::InvalidTimestamp { row, value } => write!(
                f,
                "Invalid timestamp '{value}' in row {row}: expected format {TIMESTAMP_FORMAT}"
            ),
            Self::DuplicateTimestamp { row, timestamp } => {
                write!(f, "Duplicate timestamp {timestamp} in row {row}")
            }
            Self::IrregularTimestep { row, timestamp } => write!(
                f,
                "Timestamp {timestamp} in row {row} is not one hour after the previous one"
            ),
            Self::NotCalendarYear { first } => write!(
                f,
                "Time series must start at 00:00 on 1 January of a non-leap year, but starts at \
                {first}"
            ),
            Self::OutOfRange {
                row,
                column,
                value,
                expected,
            } => write!(
                f,
                "Value {value} for {column} in row {row} is invalid: must be {expected}"
            ),
            Self::LengthMismatch {
                series,
                expected,
                found,
            } => write!(
                f,
                "Series {series} has {found} entries, but there are {expected} timesteps"
            ),
        }
    }
}

impl Error for MalformedInputError {}

/// One year of aligned hourly values.
///
/// Consumption and inflow are given as the average power over each hour, which (as timesteps are
/// one hour long) equals the energy in MWh consumed or received during that hour.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeries {
    timestamps: Vec<NaiveDateTime>,
    consumption: Vec<Power>,
    wind_capacity_factor: Vec<Dimensionless>,
    solar_capacity_factor: Vec<Dimensionless>,
    hydro_inflow: Vec<Power>,
    grid_price: Vec<MoneyPerEnergy>,
}

/// Get the hourly timestamps for the given year, starting at midnight on 1 January
pub fn hourly_timestamps(year: i32) -> Vec<NaiveDateTime> {
    let start = NaiveDate::from_ymd_opt(year, 1, 1)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .expect("Invalid year");
    std::iter::successors(Some(start), |&timestamp| Some(timestamp + TimeDelta::hours(1)))
        .take(HOURS_PER_YEAR)
        .collect()
}

fn is_leap_year(year: i32) -> bool {
    NaiveDate::from_ymd_opt(year, 2, 29).is_some()
}

/// Check that every value in a series is within the given range
fn check_range<T: Copy>(
    series: &[T],
    column: &'static str,
    expected: &'static str,
    value_of: impl Fn(T) -> f64,
    is_valid: impl Fn(f64) -> bool,
) -> Result<(), MalformedInputError> {
    for (idx, value) in series.iter().copied().map(value_of).enumerate() {
        if !(value.is_finite() && is_valid(value)) {
            return Err(MalformedInputError::OutOfRange {
                row: idx + 1,
                column,
                value,
                expected,
            });
        }
    }

    Ok(())
}

/// Check that a series has one entry per timestep
pub fn check_length(
    series: &str,
    expected: usize,
    found: usize,
) -> Result<(), MalformedInputError> {
    if found == expected {
        Ok(())
    } else {
        Err(MalformedInputError::LengthMismatch {
            series: series.to_string(),
            expected,
            found,
        })
    }
}

impl TimeSeries {
    /// Create a new [`TimeSeries`], validating its contents.
    ///
    /// # Arguments
    ///
    /// * `timestamps` - One timestamp per hour of a non-leap year
    /// * `consumption` - Demand in each hour
    /// * `wind_capacity_factor` - Wind capacity factor in each hour, in `[0, 1]`
    /// * `solar_capacity_factor` - Solar capacity factor in each hour, in `[0, 1]`
    /// * `hydro_inflow` - Hydrological inflow (as electrical energy) in each hour
    /// * `grid_price` - Market price in each hour
    pub fn new(
        timestamps: Vec<NaiveDateTime>,
        consumption: Vec<Power>,
        wind_capacity_factor: Vec<Dimensionless>,
        solar_capacity_factor: Vec<Dimensionless>,
        hydro_inflow: Vec<Power>,
        grid_price: Vec<MoneyPerEnergy>,
    ) -> Result<Self, MalformedInputError> {
        let time_series = Self {
            timestamps,
            consumption,
            wind_capacity_factor,
            solar_capacity_factor,
            hydro_inflow,
            grid_price,
        };
        time_series.validate()?;

        Ok(time_series)
    }

    fn validate(&self) -> Result<(), MalformedInputError> {
        // Check sequencing first so that a duplicated row is reported as such rather than as a
        // wrong row count
        for (idx, pair) in self.timestamps.windows(2).enumerate() {
            let row = idx + 2;
            let timestamp = pair[1];
            if timestamp == pair[0] {
                return Err(MalformedInputError::DuplicateTimestamp { row, timestamp });
            }
            if timestamp - pair[0] != TimeDelta::hours(1) {
                return Err(MalformedInputError::IrregularTimestep { row, timestamp });
            }
        }

        if self.timestamps.len() != HOURS_PER_YEAR {
            return Err(MalformedInputError::WrongRowCount {
                expected: HOURS_PER_YEAR,
                found: self.timestamps.len(),
            });
        }

        let first = self.timestamps[0];
        if first.ordinal() != 1 || first.hour() != 0 || is_leap_year(first.year()) {
            return Err(MalformedInputError::NotCalendarYear { first });
        }

        let n = HOURS_PER_YEAR;
        check_length("consumption", n, self.consumption.len())?;
        check_length("wind_capacity_factor", n, self.wind_capacity_factor.len())?;
        check_length("solar_capacity_factor", n, self.solar_capacity_factor.len())?;
        check_length("hydro_inflow", n, self.hydro_inflow.len())?;
        check_length("grid_price", n, self.grid_price.len())?;

        let non_negative = |x: f64| x >= 0.0;
        let proportion = |x: f64| (0.0..=1.0).contains(&x);
        check_range(
            &self.consumption,
            "consumption",
            "non-negative",
            Power::value,
            non_negative,
        )?;
        check_range(
            &self.wind_capacity_factor,
            "wind_capacity_factor",
            "between 0 and 1",
            Dimensionless::value,
            proportion,
        )?;
        check_range(
            &self.solar_capacity_factor,
            "solar_capacity_factor",
            "between 0 and 1",
            Dimensionless::value,
            proportion,
        )?;
        check_range(
            &self.hydro_inflow,
            "hydro_inflow",
            "non-negative",
            Power::value,
            non_negative,
        )?;
        check_range(
            &self.grid_price,
            "grid_price",
            "non-negative",
            MoneyPerEnergy::value,
            non_negative,
        )?;

        Ok(())
    }

    /// The number of timesteps
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    /// Whether there are no timesteps (never true for a validated series)
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// The timestamp of each timestep
    pub fn timestamps(&self) -> &[NaiveDateTime] {
        &self.timestamps
    }

    /// Demand in each timestep
    pub fn consumption(&self) -> &[Power] {
        &self.consumption
    }

    /// Wind capacity factor in each timestep
    pub fn wind_capacity_factor(&self) -> &[Dimensionless] {
        &self.wind_capacity_factor
    }

    /// Solar capacity factor in each timestep
    pub fn solar_capacity_factor(&self) -> &[Dimensionless] {
        &self.solar_capacity_factor
    }

    /// Hydrological inflow in each timestep
    pub fn hydro_inflow(&self) -> &[Power] {
        &self.hydro_inflow
    }

    /// Grid market price in each timestep
    pub fn grid_price(&self) -> &[MoneyPerEnergy] {
        &self.grid_price
    }

    /// Total demand over the year
    pub fn annual_consumption(&self) -> Energy {
        self.consumption.iter().map(|&p| p * TIMESTEP).sum()
    }

    /// Highest hourly demand
    pub fn peak_consumption(&self) -> Power {
        self.consumption
            .iter()
            .copied()
            .fold(Power(0.0), Power::max)
    }

    /// Rescale consumption so that total annual demand equals `annual_demand`.
    ///
    /// The shape of the demand profile is preserved.
    ///
    /// # Returns
    ///
    /// The scaling factor applied, or an error if there is no demand to scale.
    pub fn scale_consumption_to(&mut self, annual_demand: Energy) -> Result<Dimensionless> {
        let current = self.annual_consumption();
        ensure!(
            current > Energy(0.0),
            "Cannot scale consumption to {annual_demand} MWh: consumption is zero in every hour"
        );

        let factor = annual_demand / current;
        for value in &mut self.consumption {
            *value = *value * factor;
        }

        Ok(factor)
    }
}

/// Check that all required columns are present in the header row
fn check_columns(headers: &csv::StringRecord) -> Result<(), MalformedInputError> {
    let missing: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .filter(|column| !headers.iter().any(|header| header.trim() == **column))
        .map(|column| (*column).to_string())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(MalformedInputError::MissingColumns(missing))
    }
}

/// Unpack a value, returning an error if it is missing
fn require<T>(value: Option<T>, row: usize, column: &'static str) -> Result<T, MalformedInputError> {
    value.ok_or(MalformedInputError::MissingValue { row, column })
}

/// Convert raw rows into a [`TimeSeries`]
fn time_series_from_iter<I>(iter: I) -> Result<TimeSeries>
where
    I: Iterator<Item = Result<TimeSeriesRaw, csv::Error>>,
{
    let mut timestamps = Vec::with_capacity(HOURS_PER_YEAR);
    let mut consumption = Vec::with_capacity(HOURS_PER_YEAR);
    let mut wind = Vec::with_capacity(HOURS_PER_YEAR);
    let mut solar = Vec::with_capacity(HOURS_PER_YEAR);
    let mut inflow = Vec::with_capacity(HOURS_PER_YEAR);
    let mut price = Vec::with_capacity(HOURS_PER_YEAR);

    for (idx, raw) in iter.enumerate() {
        let row = idx + 1;
        let raw = raw.with_context(|| format!("Could not parse row {row}"))?;

        let timestamp = require(raw.timestamp, row, "timestamp")?;
        let timestamp = NaiveDateTime::parse_from_str(timestamp.trim(), TIMESTAMP_FORMAT)
            .map_err(|_| MalformedInputError::InvalidTimestamp {
                row,
                value: timestamp.clone(),
            })?;
        timestamps.push(timestamp);

        let consumption_kwh = require(raw.consumption_kwh, row, "consumption_kwh")?;
        consumption.push(Power(consumption_kwh / KWH_PER_MWH));
        wind.push(Dimensionless(require(
            raw.wind_capacity_factor,
            row,
            "wind_capacity_factor",
        )?));
        solar.push(Dimensionless(require(
            raw.solar_capacity_factor,
            row,
            "solar_capacity_factor",
        )?));
        let inflow_kwh = require(raw.hydro_inflow_kwh, row, "hydro_inflow_kwh")?;
        inflow.push(Power(inflow_kwh / KWH_PER_MWH));
        price.push(MoneyPerEnergy(require(
            raw.grid_price_eur_per_mwh,
            row,
            "grid_price_eur_per_mwh",
        )?));
    }

    Ok(TimeSeries::new(
        timestamps,
        consumption,
        wind,
        solar,
        inflow,
        price,
    )?)
}

/// Read the time series CSV file from the model directory.
///
/// # Arguments
///
/// * `model_dir` - Folder containing model configuration files
///
/// # Returns
///
/// A validated [`TimeSeries`] or an error.
pub fn read_time_series(model_dir: &Path) -> Result<TimeSeries> {
    let file_path = model_dir.join(TIME_SERIES_FILE_NAME);
    read_time_series_from_path(&file_path).with_context(|| input_err_msg(&file_path))
}

fn read_time_series_from_path(file_path: &Path) -> Result<TimeSeries> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(file_path)?;
    check_columns(reader.headers()?)?;

    time_series_from_iter(reader.deserialize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{assert_malformed, flat_time_series, write_time_series_csv};
    use rstest::rstest;
    use std::fs;
    use tempfile::tempdir;

    #[rstest]
    fn read_time_series_valid(flat_time_series: TimeSeries) {
        let dir = tempdir().unwrap();
        write_time_series_csv(dir.path(), &flat_time_series);

        let time_series = read_time_series(dir.path()).unwrap();
        assert_eq!(time_series, flat_time_series);
        assert_eq!(time_series.len(), HOURS_PER_YEAR);
    }

    #[test]
    fn read_time_series_converts_kwh() {
        let mut rows = format!("{}\n", REQUIRED_COLUMNS.join(","));
        for timestamp in hourly_timestamps(2019) {
            rows.push_str(&format!(
                "{},1500.0,0.5,0.25,30.0,80.0\n",
                timestamp.format(TIMESTAMP_FORMAT)
            ));
        }
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(TIME_SERIES_FILE_NAME), rows).unwrap();

        let time_series = read_time_series(dir.path()).unwrap();
        assert_eq!(time_series.consumption()[0], Power(1.5));
        assert_eq!(time_series.hydro_inflow()[0], Power(0.03));
        assert_eq!(time_series.wind_capacity_factor()[10], Dimensionless(0.5));
        assert_eq!(time_series.grid_price()[100], MoneyPerEnergy(80.0));
    }

    #[test]
    fn read_time_series_missing_column() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join(TIME_SERIES_FILE_NAME),
            "timestamp,consumption_kwh,wind_capacity_factor,solar_capacity_factor\n",
        )
        .unwrap();

        assert_malformed(
            read_time_series(dir.path()),
            &MalformedInputError::MissingColumns(vec![
                "hydro_inflow_kwh".into(),
                "grid_price_eur_per_mwh".into(),
            ]),
        );
    }

    #[test]
    fn read_time_series_null_value() {
        let mut rows = format!("{}\n", REQUIRED_COLUMNS.join(","));
        rows.push_str("2019-01-01 00:00:00,1000.0,0.5,,0.0,80.0\n");
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(TIME_SERIES_FILE_NAME), rows).unwrap();

        assert_malformed(
            read_time_series(dir.path()),
            &MalformedInputError::MissingValue {
                row: 1,
                column: "solar_capacity_factor",
            },
        );
    }

    #[test]
    fn read_time_series_bad_timestamp() {
        let mut rows = format!("{}\n", REQUIRED_COLUMNS.join(","));
        rows.push_str("01/01/2019 00:00,1000.0,0.5,0.5,0.0,80.0\n");
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(TIME_SERIES_FILE_NAME), rows).unwrap();

        assert_malformed(
            read_time_series(dir.path()),
            &MalformedInputError::InvalidTimestamp {
                row: 1,
                value: "01/01/2019 00:00".into(),
            },
        );
    }

    fn rebuild(
        time_series: &TimeSeries,
        timestamps: Vec<NaiveDateTime>,
    ) -> Result<TimeSeries, MalformedInputError> {
        let n = timestamps.len();
        TimeSeries::new(
            timestamps,
            time_series.consumption[..n].to_vec(),
            time_series.wind_capacity_factor[..n].to_vec(),
            time_series.solar_capacity_factor[..n].to_vec(),
            time_series.hydro_inflow[..n].to_vec(),
            time_series.grid_price[..n].to_vec(),
        )
    }

    #[rstest]
    fn validate_wrong_row_count(flat_time_series: TimeSeries) {
        let mut timestamps = hourly_timestamps(2019);
        timestamps.pop();
        assert_eq!(
            rebuild(&flat_time_series, timestamps),
            Err(MalformedInputError::WrongRowCount {
                expected: HOURS_PER_YEAR,
                found: HOURS_PER_YEAR - 1
            })
        );
    }

    #[rstest]
    fn validate_duplicate_timestamp(flat_time_series: TimeSeries) {
        let mut timestamps = hourly_timestamps(2019);
        timestamps[5] = timestamps[4];
        assert_eq!(
            rebuild(&flat_time_series, timestamps.clone()),
            Err(MalformedInputError::DuplicateTimestamp {
                row: 6,
                timestamp: timestamps[4]
            })
        );
    }

    #[rstest]
    fn validate_irregular_timestep(flat_time_series: TimeSeries) {
        let mut timestamps = hourly_timestamps(2019);
        timestamps[100] += TimeDelta::minutes(30);
        assert!(matches!(
            rebuild(&flat_time_series, timestamps),
            Err(MalformedInputError::IrregularTimestep { row: 101, .. })
        ));
    }

    #[rstest]
    #[case(2020)] // Leap year
    fn validate_leap_year(flat_time_series: TimeSeries, #[case] year: i32) {
        assert!(matches!(
            rebuild(&flat_time_series, hourly_timestamps(year)),
            Err(MalformedInputError::NotCalendarYear { .. })
        ));
    }

    #[rstest]
    fn validate_not_starting_on_new_year(flat_time_series: TimeSeries) {
        let timestamps = hourly_timestamps(2019)
            .into_iter()
            .map(|t| t + TimeDelta::hours(1))
            .collect();
        assert!(matches!(
            rebuild(&flat_time_series, timestamps),
            Err(MalformedInputError::NotCalendarYear { .. })
        ));
    }

    #[rstest]
    #[case::negative_capacity_factor(-0.1, 0.0, 10.0)]
    #[case::capacity_factor_above_one(1.2, 0.0, 10.0)]
    #[case::negative_inflow(0.5, -1.0, 10.0)]
    #[case::negative_price(0.5, 0.0, -10.0)]
    #[case::nan_price(0.5, 0.0, f64::NAN)]
    fn validate_out_of_range(
        flat_time_series: TimeSeries,
        #[case] wind: f64,
        #[case] inflow: f64,
        #[case] price: f64,
    ) {
        let mut wind_capacity_factor = flat_time_series.wind_capacity_factor.clone();
        wind_capacity_factor[7] = Dimensionless(wind);
        let mut hydro_inflow = flat_time_series.hydro_inflow.clone();
        hydro_inflow[7] = Power(inflow);
        let mut grid_price = flat_time_series.grid_price.clone();
        grid_price[7] = MoneyPerEnergy(price);

        let result = TimeSeries::new(
            flat_time_series.timestamps.clone(),
            flat_time_series.consumption.clone(),
            wind_capacity_factor,
            flat_time_series.solar_capacity_factor.clone(),
            hydro_inflow,
            grid_price,
        );
        assert!(matches!(
            result,
            Err(MalformedInputError::OutOfRange { row: 8, .. })
        ));
    }

    #[rstest]
    fn scale_consumption(mut flat_time_series: TimeSeries) {
        let factor = flat_time_series
            .scale_consumption_to(Energy(4380.0))
            .unwrap();
        assert_eq!(factor, Dimensionless(0.5));
        assert_eq!(flat_time_series.annual_consumption(), Energy(4380.0));
        assert_eq!(flat_time_series.peak_consumption(), Power(0.5));
    }

    #[rstest]
    fn scale_zero_consumption(flat_time_series: TimeSeries) {
        let time_series = TimeSeries::new(
            flat_time_series.timestamps.clone(),
            vec![Power(0.0); HOURS_PER_YEAR],
            flat_time_series.wind_capacity_factor.clone(),
            flat_time_series.solar_capacity_factor.clone(),
            flat_time_series.hydro_inflow.clone(),
            flat_time_series.grid_price.clone(),
        );
        assert!(time_series.unwrap().scale_consumption_to(Energy(1.0)).is_err());
    }
}
