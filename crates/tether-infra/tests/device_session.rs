// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::time::Duration;
use tether_core::device::{DeviceError, DeviceSession, TransportError};
use tether_core::input::SampleDecoder;
use tether_core::MonotonicClock;
use tether_infra::{MockConnector, MockTransport, SyntheticConnector};

const TIMEOUT: Duration = Duration::from_millis(1);

#[test]
fn mock_session_reads_frames_in_order() {
    let mock = MockTransport::new();
    let mut connector = MockConnector::new(mock.clone());
    let mut session: DeviceSession =
        DeviceSession::acquire(&mut connector, Duration::ZERO, MonotonicClock::new()).unwrap();
    assert_eq!(mock.clear_count(), 1);

    mock.inject_frame([1, 2, 3, 4]);
    mock.inject_frame([4095, 0, 2048, 2048]);

    let first = session.read(TIMEOUT).unwrap().unwrap();
    assert_eq!(first.channels(), &[1, 2, 3, 4]);
    let second = session.read(TIMEOUT).unwrap().unwrap();
    assert_eq!(second.channels(), &[4095, 0, 2048, 2048]);
    assert!(second.timestamp() >= first.timestamp());

    assert!(session.read(TIMEOUT).unwrap().is_none());
    let stats = session.stats();
    assert_eq!(stats.frames_decoded, 2);
    assert_eq!(stats.timeouts, 1);
}

#[test]
fn long_reports_decode_their_first_frame() {
    let mock = MockTransport::new();
    let mut report = SampleDecoder::<4>::encode(&[10, 20, 30, 40]);
    report.extend(SampleDecoder::<4>::encode(&[50, 60, 70, 80]));
    mock.inject_bytes(&report);

    let mut session: DeviceSession = DeviceSession::acquire(
        &mut MockConnector::new(mock.clone()),
        Duration::ZERO,
        MonotonicClock::new(),
    )
    .unwrap();
    let sample = session.read(TIMEOUT).unwrap().unwrap();
    assert_eq!(sample.channels(), &[10, 20, 30, 40]);
}

#[test]
fn fault_surfaces_and_drop_closes() {
    let mock = MockTransport::new();
    mock.inject_fault(TransportError::Disconnected);
    {
        let mut session: DeviceSession = DeviceSession::acquire(
            &mut MockConnector::new(mock.clone()),
            Duration::ZERO,
            MonotonicClock::new(),
        )
        .unwrap();
        let err = session.read(TIMEOUT).unwrap_err();
        assert_eq!(err, DeviceError::Transport(TransportError::Disconnected));
        assert!(!mock.is_closed());
    }
    assert!(mock.is_closed());
    assert_eq!(mock.close_count(), 1);
}

#[test]
fn absent_device_is_not_found() {
    let result: Result<DeviceSession, _> = DeviceSession::acquire(
        &mut MockConnector::absent(),
        Duration::ZERO,
        MonotonicClock::new(),
    );
    assert!(matches!(result, Err(DeviceError::NotFound { .. })));
}

#[test]
fn synthetic_device_streams_samples() {
    let mut connector = SyntheticConnector {
        rate_hz: 500.0,
        amplitude: 1024.0,
    };
    let mut session: DeviceSession =
        DeviceSession::acquire(&mut connector, Duration::ZERO, MonotonicClock::new()).unwrap();

    let mut received = 0;
    for _ in 0..20 {
        if let Some(sample) = session.read(Duration::from_millis(10)).unwrap() {
            assert!(sample.channels().iter().all(|c| *c <= 4095));
            received += 1;
        }
    }
    assert!(received > 0);
    assert!(session.description().starts_with("synthetic"));
    session.release();
    assert!(!session.is_open());
}
