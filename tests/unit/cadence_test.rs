//! Cadence arbitration and crank derivation tests.

use ridelink::sensors::{
    should_accept, CadenceArbiter, CadenceSource, CrankCadence, CrankRevolutionData,
};
use std::time::{Duration, Instant};

const ALL: [CadenceSource; 3] = [CadenceSource::Csc, CadenceSource::Power, CadenceSource::Ftm];

#[test]
fn test_csc_is_never_displaced() {
    let mut arbiter = CadenceArbiter::new();
    assert!(arbiter.offer(CadenceSource::Csc));

    for _ in 0..5 {
        assert!(!arbiter.offer(CadenceSource::Power));
        assert!(!arbiter.offer(CadenceSource::Ftm));
        assert_eq!(arbiter.source(), Some(CadenceSource::Csc));
    }
}

#[test]
fn test_priority_table() {
    for current in ALL {
        for candidate in ALL {
            let expected = current == candidate
                || matches!(
                    (current, candidate),
                    (CadenceSource::Ftm, CadenceSource::Power)
                        | (CadenceSource::Ftm, CadenceSource::Csc)
                        | (CadenceSource::Power, CadenceSource::Csc)
                );
            assert_eq!(
                should_accept(Some(current), candidate),
                expected,
                "{current} -> {candidate}"
            );
        }
    }
}

#[test]
fn test_ftm_only_until_another_source_appears() {
    let mut arbiter = CadenceArbiter::new();
    assert!(arbiter.offer(CadenceSource::Ftm));
    assert!(arbiter.offer(CadenceSource::Ftm));
    assert!(arbiter.offer(CadenceSource::Power));
    assert!(!arbiter.offer(CadenceSource::Ftm));
}

#[test]
fn test_spike_filter() {
    let mut crank = CrankCadence::new(Duration::from_millis(2000));
    let t0 = Instant::now();

    crank.update(
        CrankRevolutionData {
            cumulative_revolutions: 0,
            last_event_time: 0,
        },
        t0,
    );
    let spike = crank.update(
        CrankRevolutionData {
            cumulative_revolutions: 20,
            last_event_time: 1024,
        },
        t0 + Duration::from_secs(1),
    );
    assert_eq!(spike, None);
}

#[test]
fn test_reset_forgets_previous_event() {
    let mut crank = CrankCadence::new(Duration::from_millis(2000));
    let t0 = Instant::now();
    let event = |revs, time| CrankRevolutionData {
        cumulative_revolutions: revs,
        last_event_time: time,
    };

    crank.update(event(100, 0), t0);
    crank.reset();
    assert_eq!(crank.update(event(103, 512), t0), None);
    assert_eq!(crank.update(event(106, 1024), t0), Some(360));
}
