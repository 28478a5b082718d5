//! DIO card and automotive controller wrappers

mod common;

use common::{fast_config, SimulatedMcu};
use pretty_assertions::assert_eq;
use std::collections::HashMap;

use stplink_core::device::{AutomotiveController, AutomotiveSettings, DioCard, IoStates};
use stplink_core::protocol::{Kind, ProtocolError, Session, SessionConfig, SharedSession, Status};

fn shared(mcu: &SimulatedMcu, config: SessionConfig) -> SharedSession<SimulatedMcu> {
    SharedSession::new(Session::from_link(fast_config(config), "sim", mcu.clone()))
}

fn dio(mcu: &SimulatedMcu) -> DioCard<SimulatedMcu> {
    DioCard::new(shared(mcu, SessionConfig::dio_card()))
}

fn automotive(mcu: &SimulatedMcu) -> AutomotiveController<SimulatedMcu> {
    AutomotiveController::new(shared(mcu, SessionConfig::automotive("sim")))
}

fn volts(v: f32) -> Vec<u8> {
    v.to_le_bytes().to_vec()
}

#[test]
fn test_dio_inputs() {
    let mut regs = HashMap::new();
    regs.insert(0x40 | 1, vec![1]);
    regs.insert(0x40 | 6, vec![1]);
    let mcu = SimulatedMcu::with_registers(regs);
    let card = dio(&mcu);

    assert_eq!(card.get_di(1).unwrap(), 1);
    assert_eq!(card.get_di(2).unwrap(), 0);
    assert_eq!(card.get_all_inputs().unwrap(), [0, 1, 0, 0, 0, 0, 1, 0]);
}

#[test]
fn test_dio_outputs() {
    let mcu = SimulatedMcu::with_registers(HashMap::new());
    let card = dio(&mcu);

    card.set_do(4, 1).unwrap();
    assert_eq!(card.get_do(4).unwrap(), 1);
    assert_eq!(mcu.frames()[0], (Kind::SetDo.code(), vec![4, 1]));

    card.set_all_outputs([1, 0, 1, 0, 1, 0, 1, 0]).unwrap();
    assert_eq!(card.get_all_outputs().unwrap(), [1, 0, 1, 0, 1, 0, 1, 0]);
}

#[test]
fn test_dio_all_io() {
    let mut regs = HashMap::new();
    regs.insert(0x40, vec![1]);
    regs.insert(0x80 | 7, vec![1]);
    let mcu = SimulatedMcu::with_registers(regs);
    let card = dio(&mcu);

    let states = card.get_all_io().unwrap();
    assert_eq!(
        states,
        IoStates {
            inputs: [1, 0, 0, 0, 0, 0, 0, 0],
            outputs: [0, 0, 0, 0, 0, 0, 0, 1],
        }
    );
    // Inputs are read first, then outputs
    let kinds = mcu.kinds();
    assert_eq!(kinds.len(), 16);
    assert!(kinds[..8].iter().all(|&k| k == Kind::GetDi.code()));
    assert!(kinds[8..].iter().all(|&k| k == Kind::GetDo.code()));
}

#[test]
fn test_dio_contacts() {
    let mcu = SimulatedMcu::with_registers(HashMap::new());
    let card = dio(&mcu);

    card.set_di_contact(1).unwrap();
    card.set_do_contact(0).unwrap();
    assert_eq!(card.get_di_contact().unwrap(), 1);
    assert_eq!(card.get_do_contact().unwrap(), 0);
}

#[test]
fn test_dio_rejects_bad_arguments_before_io() {
    let mcu = SimulatedMcu::with_registers(HashMap::new());
    let card = dio(&mcu);

    assert!(matches!(card.get_di(8), Err(ProtocolError::InvalidArgument(_))));
    assert!(matches!(card.set_do(0, 2), Err(ProtocolError::InvalidArgument(_))));
    assert!(matches!(card.set_di_contact(3), Err(ProtocolError::InvalidArgument(_))));
    // One bad value anywhere stops the whole batch
    assert!(card.set_all_outputs([0, 0, 0, 0, 0, 0, 0, 9]).is_err());
    assert!(mcu.written().is_empty());
}

#[test]
fn test_dio_firmware_version() {
    let mut regs = HashMap::new();
    regs.insert(Kind::GetFirmwareVersion.code(), vec![2, 0, 7]);
    let mcu = SimulatedMcu::with_registers(regs);
    assert_eq!(dio(&mcu).firmware_version().unwrap(), "2.0.7");
}

#[test]
fn test_automotive_timers_are_little_endian() {
    let mcu = SimulatedMcu::with_registers(HashMap::new());
    let auto = automotive(&mcu);

    auto.set_start_up_timer(3600).unwrap();
    assert_eq!(
        mcu.frames()[0],
        (Kind::SetStartUpTimer.code(), vec![0x10, 0x0E, 0, 0, 0, 0, 0, 0])
    );
    assert_eq!(auto.get_start_up_timer().unwrap(), 3600);

    assert!(matches!(auto.set_soft_off_timer(0), Err(ProtocolError::InvalidArgument(_))));
    assert!(matches!(
        auto.set_hard_off_timer(36_001),
        Err(ProtocolError::InvalidArgument(_))
    ));
}

#[test]
fn test_automotive_flags_and_voltage() {
    let mut regs = HashMap::new();
    regs.insert(Kind::GetInputVoltage.code(), volts(12.0));
    regs.insert(Kind::GetIgnitionState.code(), vec![1]);
    let mcu = SimulatedMcu::with_registers(regs);
    let auto = automotive(&mcu);

    auto.set_automotive_mode(1).unwrap();
    auto.set_low_power_enable(0).unwrap();
    assert_eq!(auto.get_automotive_mode().unwrap(), 1);
    assert_eq!(auto.get_low_power_enable().unwrap(), 0);
    assert_eq!(auto.ignition_state().unwrap(), 1);
    assert_eq!(auto.input_voltage().unwrap(), 12.0);
}

#[test]
fn test_shutdown_voltage_below_system() {
    let mut regs = HashMap::new();
    regs.insert(Kind::GetInputVoltage.code(), volts(12.0));
    let mcu = SimulatedMcu::with_registers(regs);
    let auto = automotive(&mcu);

    auto.set_shutdown_voltage(1100).unwrap();
    assert_eq!(
        mcu.kinds(),
        vec![Kind::GetInputVoltage.code(), Kind::SetShutdownVoltage.code()]
    );
    assert_eq!(auto.get_shutdown_voltage().unwrap(), 1100);
}

#[test]
fn test_shutdown_voltage_over_system_sends_only_the_query() {
    let mut regs = HashMap::new();
    regs.insert(Kind::GetInputVoltage.code(), volts(12.0));
    let mcu = SimulatedMcu::with_registers(regs);
    let auto = automotive(&mcu);

    let err = auto.set_shutdown_voltage(1250).unwrap_err();
    assert_eq!(Status::from(&err), Status::ShutdownVoltageOverSystemVal);
    assert_eq!(Status::from(&err).code(), -10);
    assert_eq!(mcu.kinds(), vec![Kind::GetInputVoltage.code()]);
}

#[test]
fn test_all_settings_round_trip() {
    let mut regs = HashMap::new();
    regs.insert(Kind::GetInputVoltage.code(), volts(24.0));
    let mcu = SimulatedMcu::with_registers(regs);
    let auto = automotive(&mcu);

    let settings = AutomotiveSettings {
        automotive_mode: 1,
        low_power_enable: 1,
        start_up_timer: 10,
        soft_off_timer: 5,
        hard_off_timer: 15,
        low_voltage_timer: 20,
        shutdown_voltage: 1200,
    };
    auto.set_all_settings(&settings).unwrap();
    assert_eq!(auto.all_settings().unwrap(), settings);
}

#[test]
fn test_all_settings_validates_first() {
    let mcu = SimulatedMcu::with_registers(HashMap::new());
    let auto = automotive(&mcu);

    let settings = AutomotiveSettings {
        automotive_mode: 1,
        low_power_enable: 1,
        start_up_timer: 10,
        soft_off_timer: 5,
        hard_off_timer: 15,
        low_voltage_timer: 20,
        shutdown_voltage: 5000,
    };
    assert!(matches!(
        auto.set_all_settings(&settings),
        Err(ProtocolError::InvalidArgument(_))
    ));
    assert!(mcu.written().is_empty());
}
