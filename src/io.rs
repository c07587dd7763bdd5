//! Wire endpoints: MIDI ports, OSC sockets and an in-memory loopback
//!
//! A surface talks to its hardware through one [`Transport`]. Opening a
//! transport can fail; the surface then keeps `None` and all of its I/O
//! becomes a no-op.

use crate::midi::{format_hex, message_len, MidiEvent};
use crate::router::feedback::{OscArg, VendorValue, WireMessage};
use anyhow::{anyhow, bail, Context, Result};
use colored::*;
use crossbeam::channel::{unbounded, Receiver, Sender};
use midir::{MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};
use parking_lot::Mutex;
use rosc::{OscMessage, OscPacket, OscType};
use std::collections::{HashMap, VecDeque};
use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Largest UDP datagram read in one go
const OSC_BUFFER_SIZE: usize = 65_536;

/// Decoded inbound message
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Midi(MidiEvent),
    Osc { address: String, value: f64 },
}

/// One surface's connection to its hardware
pub trait Transport: Send {
    /// Everything received since the last call, oldest first.
    fn receive(&mut self) -> Vec<Inbound>;
    fn send(&mut self, message: &WireMessage) -> Result<()>;
    fn describe(&self) -> String;
}

// ---------------------------------------------------------------------------
// MIDI
// ---------------------------------------------------------------------------

/// Case-insensitive substring match on port names, or a port index.
fn find_port<T: midir::MidiIO>(io: &T, spec: &str) -> Option<(T::Port, String)> {
    let ports = io.ports();
    if let Ok(index) = spec.parse::<usize>() {
        let port = ports.get(index)?.clone();
        let name = io.port_name(&port).ok()?;
        return Some((port, name));
    }
    let pattern = spec.to_lowercase();
    ports.into_iter().find_map(|port| {
        let name = io.port_name(&port).ok()?;
        name.to_lowercase().contains(&pattern).then_some((port, name))
    })
}

type Subscribers = Arc<Mutex<Vec<Sender<Vec<u8>>>>>;

struct SharedInput {
    _connection: MidiInputConnection<()>,
    subscribers: Subscribers,
}

/// Open MIDI ports, shared by every surface that names the same port
#[derive(Default)]
pub struct MidiPortTable {
    inputs: HashMap<String, SharedInput>,
    outputs: HashMap<String, Arc<Mutex<MidiOutputConnection>>>,
}

impl MidiPortTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// A receiver fed with every message arriving on `spec`.
    fn subscribe(&mut self, spec: &str) -> Result<Receiver<Vec<u8>>> {
        let (tx, rx) = unbounded();
        if let Some(input) = self.inputs.get(spec) {
            input.subscribers.lock().push(tx);
            return Ok(rx);
        }

        let midi_in = MidiInput::new("surface-integrator-in").context("Failed to create MIDI input")?;
        let (port, name) =
            find_port(&midi_in, spec).ok_or_else(|| anyhow!("MIDI input port '{}' not found", spec))?;

        let subscribers: Subscribers = Arc::new(Mutex::new(vec![tx]));
        let fan_out = subscribers.clone();
        let connection = midi_in
            .connect(
                &port,
                "surface-integrator",
                move |_timestamp, data, _| {
                    fan_out.lock().retain(|tx| tx.send(data.to_vec()).is_ok());
                },
                (),
            )
            .map_err(|e| anyhow!("Failed to connect MIDI input '{}': {}", name, e))?;

        info!("🎹 MIDI input open: {}", name);
        self.inputs.insert(
            spec.to_string(),
            SharedInput {
                _connection: connection,
                subscribers,
            },
        );
        Ok(rx)
    }

    fn output(&mut self, spec: &str) -> Result<Arc<Mutex<MidiOutputConnection>>> {
        if let Some(out) = self.outputs.get(spec) {
            return Ok(out.clone());
        }

        let midi_out = MidiOutput::new("surface-integrator-out").context("Failed to create MIDI output")?;
        let (port, name) =
            find_port(&midi_out, spec).ok_or_else(|| anyhow!("MIDI output port '{}' not found", spec))?;
        let connection = midi_out
            .connect(&port, "surface-integrator")
            .map_err(|e| anyhow!("Failed to connect MIDI output '{}': {}", name, e))?;

        info!("🎹 MIDI output open: {}", name);
        let shared = Arc::new(Mutex::new(connection));
        self.outputs.insert(spec.to_string(), shared.clone());
        Ok(shared)
    }

    /// Open (or share) the input/output pair of a MIDI surface.
    pub fn open(&mut self, input: &str, output: &str) -> Result<MidiTransport> {
        Ok(MidiTransport {
            name: format!("midi {input}/{output}"),
            input: self.subscribe(input)?,
            output: self.output(output)?,
        })
    }
}

/// MIDI port pair of one surface
pub struct MidiTransport {
    name: String,
    input: Receiver<Vec<u8>>,
    output: Arc<Mutex<MidiOutputConnection>>,
}

impl Transport for MidiTransport {
    fn receive(&mut self) -> Vec<Inbound> {
        self.input
            .try_iter()
            .filter_map(|data| match MidiEvent::from_bytes(&data) {
                Some(evt) => Some(Inbound::Midi(evt)),
                None => {
                    trace!("Ignoring MIDI {}", format_hex(&data));
                    None
                }
            })
            .collect()
    }

    fn send(&mut self, message: &WireMessage) -> Result<()> {
        let mut out = self.output.lock();
        match message {
            WireMessage::Midi(bytes) => out
                .send(&bytes[..message_len(bytes[0])])
                .map_err(|e| anyhow!("MIDI send failed: {}", e)),
            WireMessage::SysEx(bytes) => out.send(bytes).map_err(|e| anyhow!("SysEx send failed: {}", e)),
            other => bail!("MIDI transport cannot send {:?}", other),
        }
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}

// ---------------------------------------------------------------------------
// OSC
// ---------------------------------------------------------------------------

fn flatten_packet(packet: OscPacket, out: &mut Vec<Inbound>) {
    match packet {
        OscPacket::Message(msg) => {
            let value = match msg.args.first() {
                Some(OscType::Float(f)) => *f as f64,
                Some(OscType::Double(d)) => *d,
                Some(OscType::Int(i)) => *i as f64,
                Some(OscType::Long(l)) => *l as f64,
                Some(OscType::Bool(b)) => f64::from(u8::from(*b)),
                other => {
                    trace!("OSC {} with unsupported argument {:?}", msg.addr, other);
                    return;
                }
            };
            out.push(Inbound::Osc {
                address: msg.addr,
                value,
            });
        }
        OscPacket::Bundle(bundle) => {
            for packet in bundle.content {
                flatten_packet(packet, out);
            }
        }
    }
}

/// Decode one datagram into inbound messages.
pub fn decode_osc(datagram: &[u8]) -> Vec<Inbound> {
    let mut out = Vec::new();
    match rosc::decoder::decode_udp(datagram) {
        Ok((_, packet)) => flatten_packet(packet, &mut out),
        Err(e) => debug!("Bad OSC datagram: {:?}", e),
    }
    out
}

/// Encode an outgoing OSC wire message.
pub fn encode_osc(message: &WireMessage) -> Result<Vec<u8>> {
    let (addr, args) = match message {
        WireMessage::Osc { address, arg } => {
            let arg = match arg {
                OscArg::Float(f) => OscType::Float(*f),
                OscArg::Str(s) => OscType::String(s.clone()),
            };
            (address.clone(), vec![arg])
        }
        WireMessage::OscBare { address } => (address.clone(), Vec::new()),
        other => bail!("OSC transport cannot send {:?}", other),
    };
    rosc::encoder::encode(&OscPacket::Message(OscMessage { addr, args }))
        .map_err(|e| anyhow!("OSC encode failed: {:?}", e))
}

/// UDP socket pair of one OSC surface
pub struct OscTransport {
    socket: Arc<UdpSocket>,
    remote: SocketAddr,
    buffer: Vec<u8>,
}

impl OscTransport {
    pub fn open(in_port: u16, remote_host: &str, out_port: u16) -> Result<Self> {
        Self::with_socket(Arc::new(bind_osc(in_port)?), remote_host, out_port)
    }

    fn with_socket(socket: Arc<UdpSocket>, remote_host: &str, out_port: u16) -> Result<Self> {
        let remote = format!("{remote_host}:{out_port}")
            .parse()
            .with_context(|| format!("Invalid OSC remote {}:{}", remote_host, out_port))?;
        Ok(Self {
            socket,
            remote,
            buffer: vec![0; OSC_BUFFER_SIZE],
        })
    }
}

fn bind_osc(in_port: u16) -> Result<UdpSocket> {
    let socket = UdpSocket::bind(("0.0.0.0", in_port))
        .with_context(|| format!("Failed to bind OSC port {}", in_port))?;
    socket.set_nonblocking(true).context("Failed to make OSC socket non-blocking")?;
    info!("📡 OSC listening on {}", in_port);
    Ok(socket)
}

/// Bound OSC sockets, shared by every surface listening on the same port.
/// Only the current page reads a shared socket.
#[derive(Default)]
pub struct OscSocketTable {
    sockets: HashMap<u16, Arc<UdpSocket>>,
}

impl OscSocketTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&mut self, in_port: u16, remote_host: &str, out_port: u16) -> Result<OscTransport> {
        let socket = match self.sockets.get(&in_port) {
            Some(socket) => socket.clone(),
            None => {
                let socket = Arc::new(bind_osc(in_port)?);
                self.sockets.insert(in_port, socket.clone());
                socket
            }
        };
        OscTransport::with_socket(socket, remote_host, out_port)
    }
}

impl Transport for OscTransport {
    fn receive(&mut self) -> Vec<Inbound> {
        let mut out = Vec::new();
        loop {
            match self.socket.recv_from(&mut self.buffer) {
                Ok((n, _)) => out.extend(decode_osc(&self.buffer[..n])),
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!("OSC receive failed: {}", e);
                    break;
                }
            }
        }
        out
    }

    fn send(&mut self, message: &WireMessage) -> Result<()> {
        let bytes = encode_osc(message)?;
        self.socket
            .send_to(&bytes, self.remote)
            .with_context(|| format!("OSC send to {} failed", self.remote))?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("osc {}", self.remote)
    }
}

// ---------------------------------------------------------------------------
// Vendor bus outbound
// ---------------------------------------------------------------------------

/// Hands outgoing vendor messages to the bus side over a channel
pub struct VendorTransport {
    tx: Sender<(String, VendorValue)>,
}

impl VendorTransport {
    pub fn new() -> (Self, Receiver<(String, VendorValue)>) {
        let (tx, rx) = unbounded();
        (Self { tx }, rx)
    }
}

impl Transport for VendorTransport {
    /// Vendor input arrives through the vendor-bus queue instead.
    fn receive(&mut self) -> Vec<Inbound> {
        Vec::new()
    }

    fn send(&mut self, message: &WireMessage) -> Result<()> {
        let WireMessage::Vendor { address, value } = message else {
            bail!("Vendor transport cannot send {:?}", message);
        };
        self.tx
            .send((address.clone(), value.clone()))
            .map_err(|_| anyhow!("Vendor bus is gone"))
    }

    fn describe(&self) -> String {
        "vendor bus".to_string()
    }
}

// ---------------------------------------------------------------------------
// Loopback
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct LoopbackState {
    inbound: VecDeque<Inbound>,
    sent: Vec<WireMessage>,
}

/// In-memory transport; the paired [`LoopbackHandle`] plays the hardware.
#[derive(Debug, Clone, Default)]
pub struct LoopbackTransport {
    state: Arc<Mutex<LoopbackState>>,
}

/// Hardware side of a [`LoopbackTransport`]
#[derive(Debug, Clone)]
pub struct LoopbackHandle {
    state: Arc<Mutex<LoopbackState>>,
}

impl LoopbackTransport {
    pub fn new() -> (Self, LoopbackHandle) {
        let transport = Self::default();
        let handle = LoopbackHandle {
            state: transport.state.clone(),
        };
        (transport, handle)
    }
}

impl Transport for LoopbackTransport {
    fn receive(&mut self) -> Vec<Inbound> {
        self.state.lock().inbound.drain(..).collect()
    }

    fn send(&mut self, message: &WireMessage) -> Result<()> {
        self.state.lock().sent.push(message.clone());
        Ok(())
    }

    fn describe(&self) -> String {
        "loopback".to_string()
    }
}

impl LoopbackHandle {
    pub fn push_midi(&self, status: u8, data1: u8, data2: u8) {
        self.state
            .lock()
            .inbound
            .push_back(Inbound::Midi(MidiEvent::new(status, data1, data2)));
    }

    pub fn push_osc(&self, address: impl Into<String>, value: f64) {
        self.state.lock().inbound.push_back(Inbound::Osc {
            address: address.into(),
            value,
        });
    }

    /// Everything the surface sent since the last call.
    pub fn take_sent(&self) -> Vec<WireMessage> {
        std::mem::take(&mut self.state.lock().sent)
    }
}

/// Print the MIDI ports visible to this machine.
pub fn list_ports() -> Result<()> {
    let midi_in = MidiInput::new("surface-integrator-scanner")?;
    let midi_out = MidiOutput::new("surface-integrator-scanner")?;

    println!("\n{}", "=== MIDI Input Ports ===".bold().cyan());
    let inputs = midi_in.ports();
    if inputs.is_empty() {
        println!("  {}", "(none)".yellow());
    }
    for (i, port) in inputs.iter().enumerate() {
        let name = midi_in.port_name(port).unwrap_or_else(|_| "?".into());
        println!("  {} {}", format!("[{i}]").green(), name);
    }

    println!("\n{}", "=== MIDI Output Ports ===".bold().cyan());
    let outputs = midi_out.ports();
    if outputs.is_empty() {
        println!("  {}", "(none)".yellow());
    }
    for (i, port) in outputs.iter().enumerate() {
        let name = midi_out.port_name(port).unwrap_or_else(|_| "?".into());
        println!("  {} {}", format!("[{i}]").green(), name);
    }
    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_osc_encode_decode() {
        let bytes = encode_osc(&WireMessage::Osc {
            address: "/track/1/volume".into(),
            arg: OscArg::Float(0.5),
        })
        .unwrap();
        assert_eq!(
            decode_osc(&bytes),
            vec![Inbound::Osc {
                address: "/track/1/volume".into(),
                value: 0.5
            }]
        );
    }

    #[test]
    fn test_osc_bundle_and_string_args() {
        let packet = OscPacket::Bundle(rosc::OscBundle {
            timetag: rosc::OscTime { seconds: 0, fractional: 1 },
            content: vec![
                OscPacket::Message(OscMessage {
                    addr: "/a".into(),
                    args: vec![OscType::Int(3)],
                }),
                OscPacket::Message(OscMessage {
                    addr: "/name".into(),
                    args: vec![OscType::String("x".into())],
                }),
            ],
        });
        let bytes = rosc::encoder::encode(&packet).unwrap();
        assert_eq!(
            decode_osc(&bytes),
            vec![Inbound::Osc {
                address: "/a".into(),
                value: 3.0
            }]
        );
        assert!(decode_osc(&[1, 2, 3]).is_empty());
    }

    #[test]
    fn test_bare_osc_message() {
        let bytes = encode_osc(&WireMessage::OscBare { address: "/Home".into() }).unwrap();
        let (_, packet) = rosc::decoder::decode_udp(&bytes).unwrap();
        match packet {
            OscPacket::Message(msg) => {
                assert_eq!(msg.addr, "/Home");
                assert!(msg.args.is_empty());
            }
            _ => panic!("expected a message"),
        }
        assert!(encode_osc(&WireMessage::Midi([0x90, 0, 0])).is_err());
    }

    #[test]
    fn test_loopback() {
        let (mut transport, handle) = LoopbackTransport::new();
        handle.push_midi(0x90, 0x10, 0x7F);
        handle.push_osc("/fader", 0.25);
        assert_eq!(transport.receive().len(), 2);
        assert!(transport.receive().is_empty());

        transport.send(&WireMessage::Midi([0xB0, 1, 2])).unwrap();
        assert_eq!(handle.take_sent(), vec![WireMessage::Midi([0xB0, 1, 2])]);
        assert!(handle.take_sent().is_empty());
    }

    #[test]
    fn test_vendor_transport() {
        let (mut transport, rx) = VendorTransport::new();
        transport
            .send(&WireMessage::Vendor {
                address: "Fader1".into(),
                value: VendorValue::Double(0.5),
            })
            .unwrap();
        assert!(transport.send(&WireMessage::Midi([0x90, 0, 0])).is_err());
        assert_eq!(rx.try_recv().unwrap(), ("Fader1".to_string(), VendorValue::Double(0.5)));
    }

    #[test]
    fn test_osc_transport_over_udp() {
        let peer = UdpSocket::bind("127.0.0.1:0").unwrap();
        let peer_port = peer.local_addr().unwrap().port();
        let mut transport = OscTransport::open(0, "127.0.0.1", peer_port).unwrap();

        transport
            .send(&WireMessage::Osc {
                address: "/ping".into(),
                arg: OscArg::Float(1.0),
            })
            .unwrap();
        let mut buf = [0u8; 256];
        let (n, _) = peer.recv_from(&mut buf).unwrap();
        assert_eq!(
            decode_osc(&buf[..n]),
            vec![Inbound::Osc {
                address: "/ping".into(),
                value: 1.0
            }]
        );
    }

    #[test]
    fn test_osc_sockets_shared_by_port() {
        let mut table = OscSocketTable::new();
        let a = table.open(0, "127.0.0.1", 9000).unwrap();
        let b = table.open(0, "127.0.0.1", 9001).unwrap();
        assert_eq!(table.sockets.len(), 1);
        assert!(Arc::ptr_eq(&a.socket, &b.socket));
        assert!(table.open(0, "not a host", 9000).is_err());
    }
}
