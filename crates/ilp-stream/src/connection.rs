//! Connection and stream state machines.
//!
//! A `Connection` exclusively owns its streams; streams come into being
//! the first time a frame references their id. All counters are
//! monotonically non-decreasing.

use std::collections::BTreeMap;

use ilp_packet::Address;

use crate::error::StreamError;
use crate::flow::RangeSet;
use crate::packet::Frame;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Unopened,
    Open,
    Closing,
    Closed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamState {
    Open,
    /// An end marker was sent or received; no new money or data.
    Ended,
    Closed,
}

/// Per-substream accounting.
#[derive(Clone, Debug)]
pub struct Stream {
    id: u64,
    state: StreamState,
    receive_max: u64,
    total_received: u64,
    total_sent: u64,
    remote_receive_max: u64,
    remote_total_received: u64,
    received_ranges: RangeSet,
}

impl Stream {
    fn new(id: u64, receive_max: u64) -> Self {
        Stream {
            id,
            state: StreamState::Open,
            receive_max,
            total_received: 0,
            total_sent: 0,
            remote_receive_max: 0,
            remote_total_received: 0,
            received_ranges: RangeSet::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn receive_max(&self) -> u64 {
        self.receive_max
    }

    pub fn total_received(&self) -> u64 {
        self.total_received
    }

    pub fn total_sent(&self) -> u64 {
        self.total_sent
    }

    pub fn remote_receive_max(&self) -> u64 {
        self.remote_receive_max
    }

    pub fn remote_total_received(&self) -> u64 {
        self.remote_total_received
    }

    pub fn received_ranges(&self) -> &RangeSet {
        &self.received_ranges
    }

    /// Raises the local willingness to receive. Lowering it would let
    /// already-accepted money exceed the advertisement, so it is
    /// rejected.
    pub fn set_receive_max(&mut self, receive_max: u64) -> Result<(), StreamError> {
        if receive_max < self.receive_max {
            return Err(StreamError::ReceiveMaxDecreased);
        }
        self.receive_max = receive_max;
        Ok(())
    }

    /// How much more this stream can accept.
    pub fn receivable(&self) -> u64 {
        self.receive_max.saturating_sub(self.total_received)
    }

    fn receive(&mut self, amount: u64) -> Result<(), StreamError> {
        let total = self
            .total_received
            .checked_add(amount)
            .ok_or(StreamError::ExceedsReceiveMax(self.id))?;
        if total > self.receive_max {
            return Err(StreamError::ExceedsReceiveMax(self.id));
        }
        self.total_received = total;
        Ok(())
    }

    pub fn add_sent(&mut self, amount: u64) {
        self.total_sent = self.total_sent.saturating_add(amount);
    }

    /// Applies a remote advertisement. Mirrors only move forward; a
    /// stale or reordered frame can never shrink them.
    pub fn apply_remote_max(&mut self, receive_max: u64, total_received: u64) {
        self.remote_receive_max = self.remote_receive_max.max(receive_max);
        self.remote_total_received = self.remote_total_received.max(total_received);
    }

    fn add_received_data(&mut self, offset: u64, len: u64) {
        self.received_ranges.add(offset, offset.saturating_add(len));
    }

    pub fn end(&mut self) {
        if self.state == StreamState::Open {
            self.state = StreamState::Ended;
        }
    }

    pub fn close(&mut self) {
        self.state = StreamState::Closed;
    }
}

/// What a packet's frames did to the connection, reported to the caller
/// deciding whether to fulfill.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    pub money_received: u64,
    pub ended: bool,
}

pub struct Connection {
    state: ConnectionState,
    source_account: Option<Address>,
    streams: BTreeMap<u64, Stream>,
    default_receive_max: u64,
}

impl Connection {
    pub fn new(default_receive_max: u64) -> Self {
        Connection {
            state: ConnectionState::Unopened,
            source_account: None,
            streams: BTreeMap::new(),
            default_receive_max,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn source_account(&self) -> Option<&Address> {
        self.source_account.as_ref()
    }

    pub fn streams(&self) -> impl Iterator<Item = &Stream> {
        self.streams.values()
    }

    /// The stream for `id`, created on first reference.
    pub fn stream_mut(&mut self, id: u64) -> &mut Stream {
        let default_receive_max = self.default_receive_max;
        self.streams
            .entry(id)
            .or_insert_with(|| Stream::new(id, default_receive_max))
    }

    pub fn stream(&self, id: u64) -> Option<&Stream> {
        self.streams.get(&id)
    }

    pub fn total_received(&self) -> u64 {
        self.streams
            .values()
            .fold(0u64, |acc, stream| acc.saturating_add(stream.total_received()))
    }

    /// Applies one packet's frames in encoded order.
    ///
    /// Money is validated against every touched stream's receive max
    /// before anything mutates, so a rejected packet leaves no partial
    /// application behind.
    pub fn apply_frames(&mut self, frames: &[Frame]) -> Result<ApplyOutcome, StreamError> {
        if self.state == ConnectionState::Closed {
            return Err(StreamError::ConnectionClosed);
        }

        let mut incoming: BTreeMap<u64, u64> = BTreeMap::new();
        let mut packet_total: u64 = 0;
        for frame in frames {
            if let Frame::StreamMoney {
                stream_id, amount, ..
            } = frame
            {
                let total = incoming.entry(*stream_id).or_default();
                *total = total
                    .checked_add(*amount)
                    .ok_or(StreamError::ExceedsReceiveMax(*stream_id))?;
                // The cross-stream sum must fit too, or the outcome
                // counter would wrap.
                packet_total = packet_total
                    .checked_add(*amount)
                    .ok_or(StreamError::ExceedsReceiveMax(*stream_id))?;
            }
        }
        for (stream_id, amount) in &incoming {
            let receivable = self
                .streams
                .get(stream_id)
                .map(Stream::receivable)
                .unwrap_or(self.default_receive_max);
            if *amount > receivable {
                return Err(StreamError::ExceedsReceiveMax(*stream_id));
            }
        }

        if self.state == ConnectionState::Unopened {
            self.state = ConnectionState::Open;
        }

        let mut outcome = ApplyOutcome::default();
        for frame in frames {
            match frame {
                Frame::SourceAccount { source_account } => {
                    self.source_account = Some(source_account.clone());
                }
                Frame::StreamMoney {
                    stream_id,
                    amount,
                    is_end,
                } => {
                    let stream = self.stream_mut(*stream_id);
                    stream.receive(*amount)?;
                    outcome.money_received += amount;
                    if *is_end {
                        stream.end();
                        outcome.ended = true;
                    }
                }
                Frame::StreamMoneyMax {
                    stream_id,
                    receive_max,
                    total_received,
                } => {
                    self.stream_mut(*stream_id)
                        .apply_remote_max(*receive_max, *total_received);
                }
                Frame::StreamData {
                    stream_id,
                    offset,
                    is_end,
                    data,
                } => {
                    let stream = self.stream_mut(*stream_id);
                    stream.add_received_data(*offset, data.len() as u64);
                    if *is_end {
                        stream.end();
                        outcome.ended = true;
                    }
                }
            }
        }

        if outcome.ended && self.state == ConnectionState::Open {
            self.state = ConnectionState::Closing;
        }
        Ok(outcome)
    }

    /// Frames advertising this side's willingness and receipts, sent
    /// back to the peer in every response.
    pub fn advertisement(&self) -> Vec<Frame> {
        self.streams
            .values()
            .map(|stream| Frame::StreamMoneyMax {
                stream_id: stream.id,
                receive_max: stream.receive_max,
                total_received: stream.total_received,
            })
            .collect()
    }

    pub fn close(&mut self) {
        self.state = ConnectionState::Closed;
        for stream in self.streams.values_mut() {
            stream.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::str::FromStr;

    fn money(stream_id: u64, amount: u64) -> Frame {
        Frame::StreamMoney {
            stream_id,
            amount,
            is_end: false,
        }
    }

    #[test]
    fn first_packet_opens_the_connection() {
        let mut conn = Connection::new(1_000);
        assert_eq!(conn.state(), ConnectionState::Unopened);
        let outcome = conn.apply_frames(&[money(1, 107)]).unwrap();
        assert_eq!(conn.state(), ConnectionState::Open);
        assert_eq!(outcome.money_received, 107);
        assert_eq!(conn.stream(1).unwrap().total_received(), 107);
    }

    #[test]
    fn money_beyond_receive_max_rejects_without_partial_application() {
        let mut conn = Connection::new(100);
        conn.apply_frames(&[money(1, 60)]).unwrap();

        // Two frames in one packet; the second pushes past the max, so
        // neither may land.
        let err = conn.apply_frames(&[money(1, 30), money(1, 20)]).unwrap_err();
        assert!(matches!(err, StreamError::ExceedsReceiveMax(1)));
        assert_eq!(conn.stream(1).unwrap().total_received(), 60);
    }

    #[test]
    fn money_across_streams_cannot_overflow_the_packet_total() {
        // Each stream is within its own limit; only the sum overflows.
        let mut conn = Connection::new(u64::MAX);
        let err = conn
            .apply_frames(&[money(1, u64::MAX), money(2, 1)])
            .unwrap_err();
        assert!(matches!(err, StreamError::ExceedsReceiveMax(_)));
        assert!(conn.stream(1).is_none());
        assert!(conn.stream(2).is_none());
        assert_eq!(conn.total_received(), 0);

        // Saturated streams report a saturated connection total rather
        // than a wrapped one.
        conn.apply_frames(&[money(1, u64::MAX)]).unwrap();
        conn.apply_frames(&[money(2, 1)]).unwrap();
        assert_eq!(conn.total_received(), u64::MAX);
    }

    #[test]
    fn receive_max_only_grows() {
        let mut conn = Connection::new(100);
        conn.apply_frames(&[money(1, 60)]).unwrap();
        let stream = conn.stream_mut(1);
        assert!(matches!(
            stream.set_receive_max(50),
            Err(StreamError::ReceiveMaxDecreased)
        ));
        stream.set_receive_max(200).unwrap();
        conn.apply_frames(&[money(1, 140)]).unwrap();
        assert_eq!(conn.stream(1).unwrap().total_received(), 200);
    }

    #[test]
    fn remote_mirrors_never_move_backwards() {
        let mut conn = Connection::new(0);
        conn.apply_frames(&[Frame::StreamMoneyMax {
            stream_id: 1,
            receive_max: 500,
            total_received: 80,
        }])
        .unwrap();
        conn.apply_frames(&[Frame::StreamMoneyMax {
            stream_id: 1,
            receive_max: 300,
            total_received: 40,
        }])
        .unwrap();
        let stream = conn.stream(1).unwrap();
        assert_eq!(stream.remote_receive_max(), 500);
        assert_eq!(stream.remote_total_received(), 80);
    }

    #[test]
    fn source_account_is_learned_from_frames() {
        let mut conn = Connection::new(0);
        let address = Address::from_str("example.sender").unwrap();
        conn.apply_frames(&[Frame::SourceAccount {
            source_account: address.clone(),
        }])
        .unwrap();
        assert_eq!(conn.source_account(), Some(&address));
    }

    #[test]
    fn data_offsets_accumulate_without_double_counting() {
        let mut conn = Connection::new(0);
        let chunk = |offset| Frame::StreamData {
            stream_id: 1,
            offset,
            is_end: false,
            data: Bytes::from_static(&[0u8; 10]),
        };
        conn.apply_frames(&[chunk(0), chunk(5), chunk(10)]).unwrap();
        let ranges = conn.stream(1).unwrap().received_ranges();
        assert_eq!(ranges.total(), 20);
        assert_eq!(ranges.contiguous_prefix(), 20);
    }

    #[test]
    fn end_frames_move_the_state_machines_forward() {
        let mut conn = Connection::new(1_000);
        conn.apply_frames(&[money(1, 10)]).unwrap();
        let outcome = conn
            .apply_frames(&[Frame::StreamMoney {
                stream_id: 1,
                amount: 5,
                is_end: true,
            }])
            .unwrap();
        assert!(outcome.ended);
        assert_eq!(conn.stream(1).unwrap().state(), StreamState::Ended);
        assert_eq!(conn.state(), ConnectionState::Closing);

        conn.close();
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert!(matches!(
            conn.apply_frames(&[money(1, 1)]),
            Err(StreamError::ConnectionClosed)
        ));
    }

    #[test]
    fn advertisement_reflects_every_stream() {
        let mut conn = Connection::new(1_000);
        conn.apply_frames(&[money(1, 10), money(3, 20)]).unwrap();
        let frames = conn.advertisement();
        assert_eq!(
            frames,
            vec![
                Frame::StreamMoneyMax {
                    stream_id: 1,
                    receive_max: 1_000,
                    total_received: 10,
                },
                Frame::StreamMoneyMax {
                    stream_id: 3,
                    receive_max: 1_000,
                    total_received: 20,
                },
            ]
        );
    }
}
