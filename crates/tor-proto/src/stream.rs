//! The stream multiplexer: application-visible byte streams carried over
//! a [`ClientCirc`](crate::circuit::ClientCirc), one `BEGIN`/`DATA`/`END`
//! conversation each.
//!
//! Grounded on the shape of the teacher's `stream.rs` (a `DataStream` that
//! owns a receiver fed by the circuit's reactor and tracks its own
//! flow-control window), reduced to the two-window model (circuit-level
//! and stream-level) this client implements.

use tokio::sync::mpsc;

use tor_cell::relaycell::msg::{end_reason, AnyRelayMsg, Begin, Data, End, Sendme};
use tor_cell::relaycell::{RelayMsg, StreamId, RELAY_PAYLOAD_LEN};

use crate::circuit::{ClientCirc, STREAM_WINDOW_INCREMENT, STREAM_WINDOW_START};
use crate::err::{Error, Result};

/// An open, bidirectional application stream carried over a circuit.
pub struct DataStream {
    circuit: ClientCirc,
    hop: usize,
    id: StreamId,
    from_circuit: mpsc::UnboundedReceiver<AnyRelayMsg>,
    /// Cells this client may still send before waiting for a stream-level
    /// `SENDME`.
    send_window: i32,
    /// Cells delivered to the caller since this client last sent a
    /// stream-level `SENDME`.
    deliver_count: i32,
    /// Data already received from the circuit but not yet returned by
    /// [`Self::read`].
    read_buf: Vec<u8>,
    /// Whether the far end has closed its side of the stream.
    closed: bool,
}

impl DataStream {
    /// Open a stream to `host:port` over `circuit`'s last hop, and wait for
    /// the exit to confirm the connection with `CONNECTED`.
    pub async fn open(circuit: &ClientCirc, host: &str, port: u16) -> Result<DataStream> {
        let hop = circuit.last_hop().await;
        let (id, mut from_circuit) = circuit.new_stream();

        if let Err(e) = circuit
            .send_relay_msg(hop, Some(id), AnyRelayMsg::Begin(Begin::new(host, port, 0)))
            .await
        {
            circuit.forget_stream(id);
            return Err(e);
        }

        loop {
            match from_circuit.recv().await {
                Some(AnyRelayMsg::Connected(_)) => break,
                Some(AnyRelayMsg::End(e)) => {
                    circuit.forget_stream(id);
                    return Err(Error::Protocol(format!("stream closed before opening, reason {}", e.reason)));
                }
                Some(_) => continue,
                None => {
                    circuit.forget_stream(id);
                    return Err(Error::Closed);
                }
            }
        }

        Ok(DataStream {
            circuit: circuit.clone(),
            hop,
            id,
            from_circuit,
            send_window: STREAM_WINDOW_START,
            deliver_count: 0,
            read_buf: Vec::new(),
            closed: false,
        })
    }

    /// Write all of `data` to the stream, split into `DATA` cells no
    /// larger than [`RELAY_PAYLOAD_LEN`], respecting both the circuit-level
    /// and stream-level flow-control windows.
    pub async fn write_all(&mut self, mut data: &[u8]) -> Result<()> {
        while !data.is_empty() {
            let chunk_len = data.len().min(RELAY_PAYLOAD_LEN);
            let (chunk, rest) = data.split_at(chunk_len);
            data = rest;

            self.circuit.reserve_circ_window().await?;
            self.reserve_send_window().await?;
            self.circuit
                .send_relay_msg(self.hop, Some(self.id), AnyRelayMsg::Data(Data::new(chunk.to_vec())))
                .await?;
        }
        Ok(())
    }

    /// Wait until this stream's send window has room, processing any
    /// `DATA`/`SENDME`/`END` that arrives in the meantime so nothing is
    /// lost while blocked on writing.
    async fn reserve_send_window(&mut self) -> Result<()> {
        loop {
            if self.send_window > 0 {
                self.send_window -= 1;
                return Ok(());
            }
            match self.from_circuit.recv().await {
                Some(AnyRelayMsg::Sendme(_)) => self.send_window += STREAM_WINDOW_INCREMENT,
                Some(AnyRelayMsg::Data(d)) => {
                    self.read_buf.extend_from_slice(d.as_bytes());
                    self.note_delivered().await?;
                }
                Some(AnyRelayMsg::End(_)) => {
                    self.closed = true;
                    return Err(Error::Closed);
                }
                Some(_) => continue,
                None => return Err(Error::Closed),
            }
        }
    }

    /// Read the next chunk of data from the stream, or an empty buffer
    /// once the far end has closed its side.
    pub async fn read(&mut self) -> Result<Vec<u8>> {
        if !self.read_buf.is_empty() {
            return Ok(std::mem::take(&mut self.read_buf));
        }
        if self.closed {
            return Ok(Vec::new());
        }
        loop {
            match self.from_circuit.recv().await {
                Some(AnyRelayMsg::Data(d)) => {
                    self.note_delivered().await?;
                    return Ok(d.into_bytes());
                }
                Some(AnyRelayMsg::End(_)) => {
                    self.closed = true;
                    return Ok(Vec::new());
                }
                Some(AnyRelayMsg::Sendme(_)) => self.send_window += STREAM_WINDOW_INCREMENT,
                Some(_) => continue,
                None => {
                    self.closed = true;
                    return Ok(Vec::new());
                }
            }
        }
    }

    /// Account for one delivered cell, sending a stream-level `SENDME`
    /// once the threshold is reached.
    async fn note_delivered(&mut self) -> Result<()> {
        self.deliver_count += 1;
        if self.deliver_count >= STREAM_WINDOW_INCREMENT {
            self.deliver_count = 0;
            self.circuit
                .send_relay_msg(self.hop, Some(self.id), AnyRelayMsg::Sendme(Sendme::empty()))
                .await?;
        }
        Ok(())
    }

    /// Close this stream, telling the exit relay we are done with it.
    pub async fn close(mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.circuit
                .send_relay_msg(self.hop, Some(self.id), AnyRelayMsg::End(End::new(end_reason::NONE)))
                .await?;
        }
        Ok(())
    }
}

impl Drop for DataStream {
    fn drop(&mut self) {
        self.circuit.forget_stream(self.id);
    }
}
