//! End-to-end scenarios over the RN/ASCII wire format.
//!
//! Reference setup: 10 ms tick, 115200 baud, two cells
//! (`float speed`, `uint16 pwm[4]`), strobe period 10 ticks.

use std::cell::RefCell;
use std::rc::Rc;

use lasso::core::CellType;
use lasso::{Config, Host, SendError, Transport};

#[derive(Clone, Default)]
struct Wire(Rc<RefCell<WireState>>);

#[derive(Default)]
struct WireState {
    bytes: Vec<u8>,
    sends: usize,
    /// Remaining `send` calls answered with busy
    busy: usize,
}

impl Wire {
    fn bytes(&self) -> Vec<u8> {
        self.0.borrow().bytes.clone()
    }

    fn sends(&self) -> usize {
        self.0.borrow().sends
    }

    fn set_busy(&self, count: usize) {
        self.0.borrow_mut().busy = count;
    }

    fn clear(&self) {
        self.0.borrow_mut().bytes.clear();
    }
}

impl Transport for Wire {
    fn send(&mut self, chunk: &[u8]) -> Result<(), SendError> {
        let mut state = self.0.borrow_mut();
        if state.busy > 0 {
            state.busy -= 1;
            return Err(SendError::Busy);
        }
        state.sends += 1;
        state.bytes.extend_from_slice(chunk);
        Ok(())
    }
}

fn leak<T>(value: T) -> &'static mut T {
    Box::leak(Box::new(value))
}

struct Rig {
    host: Host<Wire>,
    wire: Wire,
    speed: &'static mut f32,
    pwm: &'static mut [u16; 4],
}

fn rig() -> Rig {
    rig_with(Config {
        command_buffer_size: 16,
        ..Config::default()
    })
}

fn rig_with(cfg: Config) -> Rig {
    let wire = Wire::default();
    let mut host = Host::new(cfg, wire.clone()).unwrap();

    let speed = leak(0.0f32);
    let pwm = leak([0u16; 4]);
    unsafe {
        host.register_cell(
            CellType::FLOAT.with(CellType::ENABLE | CellType::WRITEABLE),
            1,
            speed as *mut f32 as *const (),
            "speed",
            "m/s",
            None,
            1,
        )
        .unwrap();
        host.register_cell(
            CellType::UINT16.with(CellType::ENABLE),
            4,
            pwm as *mut [u16; 4] as *const (),
            "pwm",
            "rpm",
            None,
            1,
        )
        .unwrap();
    }
    host.register_mem().unwrap();

    Rig { host, wire, speed, pwm }
}

impl Rig {
    fn send(&mut self, command: &str) {
        for byte in command.bytes() {
            self.host.receive_byte(byte).unwrap();
        }
    }

    fn ticks(&mut self, count: usize) {
        for _ in 0..count {
            self.host.handle_com();
        }
    }

    /// Leave advertising without side effects on the wire.
    fn go_idle(&mut self) {
        self.send("W,0\r\n");
        self.ticks(5);
        assert!(!self.host.is_advertising());
        self.wire.clear();
    }
}

#[test]
fn test_get_data_cell_count() {
    let mut rig = rig();
    rig.go_idle();

    rig.send("n\r\n");
    rig.ticks(5);
    assert_eq!(rig.wire.bytes(), b"n,2,0\r\n");
}

#[test]
fn test_get_data_cell_params() {
    let mut rig = rig();
    rig.go_idle();

    rig.send("p,1\r\n");
    rig.ticks(5);
    // type 0x0022 | enable = 0x0023, offset 4 behind the float
    assert_eq!(rig.wire.bytes(), b"p,pwm,35,4,rpm,1,4,0\r\n");
}

#[test]
fn test_get_data_cell_value() {
    let mut rig = rig();
    rig.go_idle();
    *rig.speed = 12.5;

    rig.send("v,0\r\n");
    rig.ticks(5);
    assert_eq!(rig.wire.bytes(), b"v,12.5,0\r\n");
}

#[test]
fn test_unknown_cell_reports_bad_address() {
    let mut rig = rig();
    rig.go_idle();

    rig.send("p,7\r\n");
    rig.ticks(5);
    assert_eq!(rig.wire.bytes(), b"p,14\r\n");
}

#[test]
fn test_unknown_opcode_reports_not_supported() {
    let mut rig = rig();
    rig.go_idle();

    rig.send("q\r\n");
    rig.ticks(5);
    assert_eq!(rig.wire.bytes(), b"q,95\r\n");
}

#[test]
fn test_start_stop_strobe() {
    let mut rig = rig();
    *rig.speed = 1.0;
    rig.pwm.copy_from_slice(&[10, 20, 30, 40]);

    rig.send("W,1\r\n");
    rig.ticks(4);
    assert!(rig.host.is_strobing());
    assert!(!rig.host.is_advertising());

    // starting the strobe is silent, only the snapshot goes out
    let bytes = rig.wire.bytes();
    assert_eq!(bytes.len(), 12);
    assert_eq!(&bytes[..4], &1.0f32.to_ne_bytes());
    assert_eq!(&bytes[4..6], &10u16.to_ne_bytes());

    rig.ticks(10);
    assert_eq!(rig.wire.bytes().len(), 24);

    rig.send("W,0\r\n");
    rig.ticks(20);
    assert!(!rig.host.is_strobing());
    assert_eq!(rig.wire.bytes().len(), 24);
}

#[test]
fn test_set_data_cell_value() {
    let mut rig = rig();
    rig.go_idle();

    rig.send("V,0,3.25\r\n");
    rig.ticks(5);
    assert_eq!(*rig.speed, 3.25);
    assert_eq!(rig.wire.bytes(), b"V,0\r\n");
}

#[test]
fn test_write_to_read_only_cell() {
    let mut rig = rig();
    rig.go_idle();

    rig.send("V,1,9\r\n");
    rig.ticks(5);
    assert_eq!(rig.wire.bytes(), b"V,13\r\n");
    assert_eq!(rig.pwm[0], 0);
}

#[test]
fn test_change_hook_can_reject() {
    fn reject_negative(value: &lasso::Value<'_>) -> bool {
        !matches!(value, lasso::Value::F32(v) if *v < 0.0)
    }

    let wire = Wire::default();
    let mut host = Host::new(Config::default(), wire.clone()).unwrap();
    let gain = leak(1.0f32);
    unsafe {
        host.register_cell(
            CellType::FLOAT.with(CellType::ENABLE | CellType::WRITEABLE),
            1,
            gain as *mut f32 as *const (),
            "gain",
            "",
            Some(reject_negative),
            1,
        )
        .unwrap();
    }
    host.register_mem().unwrap();

    for byte in b"W,0\r\n" {
        host.receive_byte(*byte).unwrap();
    }
    for _ in 0..6 {
        host.handle_com();
    }
    for byte in b"V,0,-2.0\r\n" {
        host.receive_byte(*byte).unwrap();
    }
    for _ in 0..6 {
        host.handle_com();
    }
    // the hook refused, memory is untouched, but no error is reported
    assert_eq!(*gain, 1.0);
    assert!(wire.bytes().ends_with(b"V,0\r\n"));
}

#[test]
fn test_set_strobe_period_validates_range() {
    let mut rig = rig();
    rig.go_idle();

    rig.send("P,100\r\n");
    rig.ticks(5);
    assert_eq!(rig.wire.bytes(), b"P,0\r\n");
    rig.wire.clear();

    // below strobe_period_min_ticks
    rig.send("P,2\r\n");
    rig.ticks(5);
    assert_eq!(rig.wire.bytes(), b"P,22\r\n");
}

#[test]
fn test_set_cell_strobe_changes_payload() {
    let mut rig = rig();
    rig.go_idle();

    rig.send("S,1,0\r\n");
    rig.ticks(5);
    assert_eq!(rig.wire.bytes(), b"S,0\r\n");
    rig.wire.clear();

    // pwm disabled, only the float remains in the strobe
    rig.send("W,1\r\n");
    rig.ticks(4);
    assert_eq!(rig.wire.bytes().len(), 4);
}

#[test]
fn test_set_cell_strobe_rejected_while_strobing() {
    let mut rig = rig();
    rig.go_idle();
    rig.send("W,1\r\n");
    rig.ticks(4);
    rig.wire.clear();

    // silently ignored in the non-interleaving encoding
    rig.send("S,1,0\r\n");
    rig.ticks(6);
    let bytes = rig.wire.bytes();
    assert!(!bytes.contains(&b'S'));
}

#[test]
fn test_gets_ignored_while_strobing() {
    let mut rig = rig();
    rig.go_idle();
    rig.send("W,1\r\n");
    rig.ticks(4);
    rig.wire.clear();

    rig.send("n\r\n");
    rig.ticks(6);
    // only strobe payload on the wire, no ASCII reply
    assert!(!rig.wire.bytes().windows(2).any(|w| w == b"n,"));
}

#[test]
fn test_advertisement_signature() {
    let mut rig = rig();
    rig.ticks(10);

    let bytes = rig.wire.bytes();
    assert_eq!(bytes.len(), 16);
    assert_eq!(&bytes[..10], b"lassoHost/");
    assert_eq!(&bytes[14..], b"\r\n");

    // next signature one advertisement period (250 ms / 10 ms) later
    rig.ticks(25);
    assert_eq!(rig.wire.bytes().len(), 32);
}

#[test]
fn test_set_advertise_is_idempotent() {
    let mut rig = rig();
    rig.go_idle();
    rig.send("W,1\r\n");
    rig.ticks(4);
    assert!(rig.host.is_strobing());

    rig.send("A\r\n");
    rig.ticks(5);
    assert!(!rig.host.is_strobing());
    assert!(rig.host.is_advertising());

    rig.send("A\r\n");
    rig.ticks(5);
    assert!(!rig.host.is_strobing());
    assert!(rig.host.is_advertising());
}

#[test]
fn test_receive_timeout_discards_partial_frame() {
    let mut rig = rig();
    rig.go_idle();

    rig.send("n");
    rig.ticks(6); // command_timeout_ticks is 5

    // the terminator alone no longer completes the stale frame
    rig.host.receive_byte(b'\r').unwrap();
    assert!(rig.host.receive_byte(b'\n').is_err());
    rig.ticks(5);
    assert_eq!(rig.wire.bytes(), b"");
}

#[test]
fn test_second_frame_blocked_until_consumed() {
    let mut rig = rig();
    rig.go_idle();

    rig.send("n\r\n");
    // the first frame is still pending, further ingress is refused
    assert!(rig.host.receive_byte(b'n').is_err());
    rig.ticks(5);
    assert_eq!(rig.wire.bytes(), b"n,2,0\r\n");
}

#[test]
fn test_overdrive_and_negative_margin() {
    let wire = Wire::default();
    let cfg = Config {
        strobe_period_min_ticks: 1,
        strobe_period_ticks: 1,
        ..Config::default()
    };
    let mut host = Host::new(cfg, wire.clone()).unwrap();
    let bulk = leak([0u16; 2000]);
    unsafe {
        host.register_cell(
            CellType::UINT16.with(CellType::ENABLE),
            2000,
            bulk as *mut [u16; 2000] as *const (),
            "bulk",
            "",
            None,
            1,
        )
        .unwrap();
    }
    host.register_mem().unwrap();

    for byte in b"W,1\r\n" {
        host.receive_byte(*byte).unwrap();
    }
    for _ in 0..4 {
        host.handle_com();
    }
    assert!(host.is_strobing());

    // the transmitter stalls, the next cycle arrives with bytes pending
    wire.set_busy(8);
    for _ in 0..4 {
        host.handle_com();
    }
    assert!(host.overdrive());

    // 4000 bytes per 10 ms vastly exceeds 115200 baud
    for byte in b"W,0\r\n" {
        host.receive_byte(*byte).unwrap();
    }
    for _ in 0..8 {
        host.handle_com();
    }
    wire.clear();
    for byte in b"t\r\n" {
        host.receive_byte(*byte).unwrap();
    }
    for _ in 0..5 {
        host.handle_com();
    }
    let reply = wire.bytes();
    let text = std::str::from_utf8(&reply).unwrap();
    let margin: i32 = text
        .trim_end()
        .split(',')
        .nth(7)
        .unwrap()
        .parse()
        .unwrap();
    assert!(margin < 0);
}

#[test]
fn test_one_send_attempt_per_tick() {
    let mut rig = rig();
    rig.go_idle();
    let before = rig.wire.sends();

    rig.send("W,1\r\n");
    rig.ticks(40);
    // never more than one transmit attempt per tick
    assert!(rig.wire.sends() - before <= 40);
}

#[test]
fn test_control_passthrough() {
    use std::sync::atomic::{AtomicUsize, Ordering};
    static CONTROL_LEN: AtomicUsize = AtomicUsize::new(0);

    fn on_control(bytes: &[u8]) {
        CONTROL_LEN.store(bytes.len(), Ordering::SeqCst);
        assert_eq!(bytes, b"abc");
    }

    let mut rig = rig();
    rig.host.set_control_hook(on_control);
    rig.go_idle();

    for &byte in b"\xc1abc\r\n" {
        rig.host.receive_byte(byte).unwrap();
    }
    rig.ticks(5);
    // delivered to the hook, never to the interpreter
    assert_eq!(CONTROL_LEN.load(Ordering::SeqCst), 3);
    assert_eq!(rig.wire.bytes(), b"");
}

#[test]
fn test_external_strobe_sync() {
    let mut rig = rig_with(Config {
        command_buffer_size: 16,
        strobe_external_sync: true,
        ..Config::default()
    });
    rig.go_idle();
    rig.send("W,1\r\n");
    rig.ticks(10);
    assert!(rig.host.is_strobing());
    // without external countdown events no cycle ever elapses
    assert_eq!(rig.wire.bytes(), b"");

    rig.host.countdown(1);
    rig.ticks(1);
    assert_eq!(rig.wire.bytes().len(), 12);
}

#[test]
fn test_timestamp_cell_counts_ticks() {
    let wire = Wire::default();
    let cfg = Config {
        timestamp: true,
        ..Config::default()
    };
    let mut host = Host::new(cfg, wire.clone()).unwrap();
    host.register_mem().unwrap();
    assert_eq!(host.cell_count(), 1);

    for _ in 0..7 {
        host.handle_com();
    }
    assert_eq!(host.timestamp(), Some(7));
}
