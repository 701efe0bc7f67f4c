//! End-to-end scenarios over an ESCS-framed channel, and the
//! interrupt-sharing pattern for the host value.

use std::cell::RefCell;
use std::rc::Rc;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use lasso::core::CellType;
use lasso::encoding::{escs, Inline};
use lasso::{Config, Host, SendError, Transport};

#[derive(Clone, Default)]
struct Wire(Rc<RefCell<Vec<u8>>>);

impl Wire {
    fn frames(&self) -> Vec<Vec<u8>> {
        let mut decoder = escs::EscsDecoder::new();
        let mut dest = [0u8; 254];
        let mut frames = Vec::new();
        for &byte in self.0.borrow().iter() {
            if let Inline::Frame(len) = decoder.feed(byte, &mut dest) {
                frames.push(dest[..len].to_vec());
            }
        }
        frames
    }
}

impl Transport for Wire {
    fn send(&mut self, chunk: &[u8]) -> Result<(), SendError> {
        self.0.borrow_mut().extend_from_slice(chunk);
        Ok(())
    }
}

fn leak<T>(value: T) -> &'static mut T {
    Box::leak(Box::new(value))
}

fn escs_config() -> Config {
    Config {
        command_encoding: lasso::core::Encoding::Escs,
        strobe_encoding: lasso::core::Encoding::Escs,
        ..Config::default()
    }
}

fn escs_command(payload: &[u8]) -> Vec<u8> {
    let mut wire = vec![0u8; payload.len() * 2 + escs::OVERHEAD];
    let len = escs::encode(payload, &mut wire, payload.len());
    wire.truncate(len);
    wire
}

fn rig() -> (Host<Wire>, Wire, &'static mut [u16; 2]) {
    let wire = Wire::default();
    let mut host = Host::new(escs_config(), wire.clone()).unwrap();
    let pair = leak([0u16; 2]);
    unsafe {
        host.register_cell(
            CellType::UINT16.with(CellType::ENABLE | CellType::WRITEABLE),
            2,
            pair as *mut [u16; 2] as *const (),
            "pair",
            "",
            None,
            1,
        )
        .unwrap();
    }
    host.register_mem().unwrap();
    (host, wire, pair)
}

fn drive(host: &mut Host<Wire>, command: &[u8], ticks: usize) {
    for byte in escs_command(command) {
        host.receive_byte(byte).unwrap();
    }
    for _ in 0..ticks {
        host.handle_com();
    }
}

#[test]
fn test_command_reply_round_trip() {
    let (mut host, wire, _) = rig();

    drive(&mut host, b"n", 6);
    let frames = wire.frames();
    assert!(frames.iter().any(|f| f == b"n,1,0"));
}

#[test]
fn test_strobe_escapes_delimiter_bytes() {
    let (mut host, wire, pair) = rig();
    // both halves of the first word need escaping on the wire
    pair[0] = u16::from_ne_bytes([0x7e, 0x7d]);
    pair[1] = 0x1111;

    drive(&mut host, b"W,1", 8);
    let frames = wire.frames();
    let strobe = frames.iter().find(|f| f[0] == 0xc1).unwrap();
    assert_eq!(strobe.len(), 5);
    assert_eq!(&strobe[1..3], &[0x7e, 0x7d]);

    // the raw stream must not contain a bare delimiter inside a frame
    let bytes = wire.0.borrow().clone();
    let inner = &bytes[1..bytes.len() - 1];
    assert!(inner.windows(2).all(|w| w != [0x7e, 0x7e]));
}

#[test]
fn test_set_value_reply() {
    let (mut host, wire, pair) = rig();

    drive(&mut host, b"W,0", 6);
    drive(&mut host, b"V,0,513", 6);
    assert_eq!(pair[0], 513);
    assert!(wire.frames().iter().any(|f| f == b"V,0"));
}

#[test]
fn test_host_shared_with_interrupt_context() {
    // the pattern for a host ticked from a timer interrupt while bytes
    // arrive in a UART interrupt: a blocking mutex around the host value
    let (host, wire, _) = rig();
    let host: Mutex<CriticalSectionRawMutex, RefCell<Host<Wire>>> =
        Mutex::new(RefCell::new(host));

    host.lock(|h| {
        for byte in escs_command(b"n") {
            h.borrow_mut().receive_byte(byte).unwrap();
        }
    });
    for _ in 0..6 {
        host.lock(|h| h.borrow_mut().handle_com());
    }
    assert!(wire.frames().iter().any(|f| f == b"n,1,0"));
}
