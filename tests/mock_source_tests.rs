use breatheasy::fault_injection::{AIR_QUALITY_FAILURE_PROBABILITY, CLIMATE_FAILURE_PROBABILITY};
use breatheasy::sensors::{estimate_air_quality, MockAirQuality, MockClimate, SensorSource};

const DRAWS: u32 = 100_000;
// Roughly five standard deviations at these rates and draw counts
const TOLERANCE: f64 = 0.004;

#[test]
fn test_climate_mock_failure_rate_and_bounds() {
    let mut mock = MockClimate::new(CLIMATE_FAILURE_PROBABILITY, 0x5EED);
    let mut failures = 0u32;

    for _ in 0..DRAWS {
        let sample = mock.read();
        match (sample.temperature_c, sample.humidity_percent) {
            (Some(t), Some(h)) => {
                assert!((15.0..=30.0).contains(&t), "temperature {t} out of range");
                assert!((30.0..=80.0).contains(&h), "humidity {h} out of range");
            }
            (None, None) => failures += 1,
            partial => panic!("partial climate sample {partial:?}"),
        }
    }

    let rate = f64::from(failures) / f64::from(DRAWS);
    assert!((rate - 0.03).abs() < TOLERANCE, "climate failure rate {rate}");
    assert_eq!(mock.failure_stats().draws, u64::from(DRAWS));
}

#[test]
fn test_air_quality_mock_failure_rate_and_bounds() {
    let mut mock = MockAirQuality::new(AIR_QUALITY_FAILURE_PROBABILITY, 0xA1A1);
    let mut failures = 0u32;

    for _ in 0..DRAWS {
        let sample = mock.read();
        if sample.is_empty() {
            failures += 1;
            continue;
        }
        let (pm25, pm10, co2, voc) = (
            sample.pm25.unwrap(),
            sample.pm10.unwrap(),
            sample.co2_ppm.unwrap(),
            sample.voc_ppb.unwrap(),
        );
        assert!((5.0..=50.0).contains(&pm25));
        assert!((10.0..=100.0).contains(&pm10));
        assert!((400.0..=2000.0).contains(&co2));
        assert!((0.0..=500.0).contains(&voc));
    }

    let rate = f64::from(failures) / f64::from(DRAWS);
    assert!((rate - 0.05).abs() < TOLERANCE, "air quality failure rate {rate}");
}

#[test]
fn test_same_seed_same_sequence() {
    let mut a = MockClimate::new(CLIMATE_FAILURE_PROBABILITY, 99);
    let mut b = MockClimate::new(CLIMATE_FAILURE_PROBABILITY, 99);
    for _ in 0..100 {
        assert_eq!(a.read(), b.read());
    }
}

#[test]
fn test_gas_resistance_estimates() {
    let sample = estimate_air_quality(50_000.0);
    assert_eq!(sample.pm25, Some(45.0));
    assert_eq!(sample.pm10, Some(67.5));
    assert_eq!(sample.co2_ppm, Some(775.0));
    assert_eq!(sample.voc_ppb, Some(500.0));
}
