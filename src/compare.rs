//! Provider comparison
//!
//! Side-by-side view of one identifier's valuation at both providers on one
//! date, plus alerts for whatever is missing. Differences are always PRECIA
//! minus PIP_LATAM.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use valuation_types::{Provider, ValuationRecord};

/// The figures compared for one provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSnapshot {
    pub provider: Provider,
    pub clean_price: Option<f64>,
    pub dirty_price: Option<f64>,
    pub yield_rate: Option<f64>,
    pub duration: Option<f64>,
    pub convexity: Option<f64>,
}

impl From<&ValuationRecord> for ProviderSnapshot {
    fn from(record: &ValuationRecord) -> Self {
        Self {
            provider: record.provider,
            clean_price: record.clean_price,
            dirty_price: record.dirty_price,
            yield_rate: record.yield_rate,
            duration: record.duration,
            convexity: record.convexity,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderDifferences {
    pub clean_price: Option<f64>,
    pub yield_rate: Option<f64>,
    pub duration: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderComparison {
    pub identifier: String,
    /// Requested date, or the latest date with any valuation
    pub valuation_date: Option<NaiveDate>,
    pub pip_latam: Option<ProviderSnapshot>,
    pub precia: Option<ProviderSnapshot>,
    /// Present only when both providers have a valuation
    pub differences: Option<ProviderDifferences>,
}

/// Compare both providers for `identifier` on `date` (latest date when `None`)
pub fn compare_providers(
    records: &[ValuationRecord],
    identifier: &str,
    date: Option<NaiveDate>,
) -> ProviderComparison {
    let identifier = identifier.trim().to_uppercase();
    let for_identifier: Vec<&ValuationRecord> = records
        .iter()
        .filter(|r| r.identifier.eq_ignore_ascii_case(&identifier))
        .collect();

    let date = date.or_else(|| for_identifier.iter().map(|r| r.valuation_date).max());

    let snapshot = |provider: Provider| -> Option<ProviderSnapshot> {
        let date = date?;
        for_identifier
            .iter()
            .find(|r| r.provider == provider && r.valuation_date == date)
            .map(|r| ProviderSnapshot::from(*r))
    };
    let pip_latam = snapshot(Provider::PipLatam);
    let precia = snapshot(Provider::Precia);

    let differences = match (&pip_latam, &precia) {
        (Some(pip), Some(precia)) => Some(ProviderDifferences {
            clean_price: difference(precia.clean_price, pip.clean_price),
            yield_rate: difference(precia.yield_rate, pip.yield_rate),
            duration: difference(precia.duration, pip.duration),
        }),
        _ => None,
    };

    ProviderComparison {
        identifier,
        valuation_date: date,
        pip_latam,
        precia,
        differences,
    }
}

fn difference(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    Some(a? - b?)
}

/// One data-quality finding for a comparison
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "alert", rename_all = "snake_case")]
pub enum DataAlert {
    NoValuations { identifier: String },
    MissingProvider { identifier: String, provider: Provider, date: NaiveDate },
    MissingCleanPrice { identifier: String, provider: Provider },
    MissingYield { identifier: String, provider: Provider },
}

/// Missing providers and missing critical figures
pub fn missing_data_alerts(comparison: &ProviderComparison) -> Vec<DataAlert> {
    let identifier = comparison.identifier.clone();
    let Some(date) = comparison.valuation_date else {
        return vec![DataAlert::NoValuations { identifier }];
    };

    let mut alerts = Vec::new();
    for (provider, snapshot) in [
        (Provider::PipLatam, &comparison.pip_latam),
        (Provider::Precia, &comparison.precia),
    ] {
        match snapshot {
            None => alerts.push(DataAlert::MissingProvider {
                identifier: identifier.clone(),
                provider,
                date,
            }),
            Some(s) => {
                if s.clean_price.is_none() {
                    alerts.push(DataAlert::MissingCleanPrice {
                        identifier: identifier.clone(),
                        provider,
                    });
                }
                if s.yield_rate.is_none() {
                    alerts.push(DataAlert::MissingYield {
                        identifier: identifier.clone(),
                        provider,
                    });
                }
            }
        }
    }
    alerts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn record(provider: Provider, date: NaiveDate, price: Option<f64>, yld: Option<f64>) -> ValuationRecord {
        let mut r = ValuationRecord::new("COB07CDOPY71", date, provider);
        r.clean_price = price;
        r.yield_rate = yld;
        r.duration = Some(2.0);
        r
    }

    #[test]
    fn test_differences_are_precia_minus_pip() {
        let records = vec![
            record(Provider::PipLatam, d(2025, 6, 3), Some(100.0), Some(9.0)),
            record(Provider::Precia, d(2025, 6, 3), Some(100.5), Some(8.75)),
            record(Provider::Precia, d(2025, 6, 2), Some(90.0), Some(1.0)),
        ];
        let cmp = compare_providers(&records, "cob07cdopy71", None);
        assert_eq!(cmp.valuation_date, Some(d(2025, 6, 3)));
        let diff = cmp.differences.unwrap();
        assert_eq!(diff.clean_price, Some(0.5));
        assert_eq!(diff.yield_rate, Some(-0.25));
        assert_eq!(diff.duration, Some(0.0));
    }

    #[test]
    fn test_alerts_for_missing_provider_and_fields() {
        let records = vec![record(Provider::Precia, d(2025, 6, 3), None, Some(8.75))];
        let cmp = compare_providers(&records, "COB07CDOPY71", None);
        assert!(cmp.differences.is_none());
        let alerts = missing_data_alerts(&cmp);
        assert_eq!(
            alerts,
            vec![
                DataAlert::MissingProvider {
                    identifier: "COB07CDOPY71".to_string(),
                    provider: Provider::PipLatam,
                    date: d(2025, 6, 3),
                },
                DataAlert::MissingCleanPrice {
                    identifier: "COB07CDOPY71".to_string(),
                    provider: Provider::Precia,
                },
            ]
        );
    }

    #[test]
    fn test_no_valuations() {
        let cmp = compare_providers(&[], "COB07CDOPY71", None);
        assert_eq!(
            missing_data_alerts(&cmp),
            vec![DataAlert::NoValuations {
                identifier: "COB07CDOPY71".to_string()
            }]
        );
    }
}
