//! ESP-IDF radio back-end.
//!
//! WiFi station and iTWT go through `EspWifi` plus raw `esp_wifi_*` calls;
//! the beacon uses Bluedroid's extended advertising GAP API on top of
//! `BtDriver<Ble>`. Driver callbacks run on ESP-IDF tasks and only forward
//! events into the dispatcher channel.
//!
//! iTWT needs an 802.11ax chip (ESP32-C6 or later) and an AP that supports
//! individual TWT.

use super::{
    AdvertisingRadio, DutyCycleRadio, EventSender, RadioError, RadioEvent, StationRadio,
};
use crate::ble::{
    AddressType, AdvCommand, AdvCompletion, AdvStep, AdvertisingMode, AdvertisingParameters,
    FilterPolicy, PrimaryPhy, SecondaryPhy, TxPower,
};
use crate::config::WifiConfig;
use crate::twt::{
    encode_micros, AgreedSchedule, DutyCycleRequest, NegotiationMode, SetupStatus, TwtEvent,
    TU_MICROS,
};
use crate::wifi::StationEvent;
use core::ffi::c_void;
use esp_idf_hal::modem::{BluetoothModem, WifiModem};
use esp_idf_svc::bt::{Ble, BtDriver};
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::{AuthMethod, ClientConfiguration, Configuration, EspWifi};
use esp_idf_sys::{self as sys, esp};
use log::{debug, info, warn};
use std::net::Ipv4Addr;
use std::sync::OnceLock;

/// Dispatcher channel used by the C callbacks.
static EVENTS: OnceLock<EventSender> = OnceLock::new();

/// Timeout the driver applies to an unanswered TWT setup.
const TWT_SETUP_TIMEOUT_MS: u16 = 5000;

/// Bring up WiFi and BLE and hook their events into `events`.
///
/// May be called once per boot.
pub fn init(
    wifi_modem: WifiModem,
    bt_modem: BluetoothModem,
    sysloop: EspSystemEventLoop,
    nvs: EspDefaultNvsPartition,
    events: EventSender,
) -> Result<(EspStation, EspDutyCycle, EspAdvertising), RadioError> {
    EVENTS
        .set(events)
        .map_err(|_| RadioError::Rejected("radio already initialized".into()))?;

    let wifi = EspWifi::new(wifi_modem, sysloop, Some(nvs.clone()))?;

    unsafe {
        esp!(sys::esp_event_handler_register(
            sys::WIFI_EVENT,
            sys::ESP_EVENT_ANY_ID,
            Some(on_wifi_event),
            std::ptr::null_mut()
        ))?;
        esp!(sys::esp_event_handler_register(
            sys::IP_EVENT,
            sys::ip_event_t_IP_EVENT_STA_GOT_IP as i32,
            Some(on_wifi_event),
            std::ptr::null_mut()
        ))?;
    }
    info!("WiFi driver initialized");

    // Releases Classic BT memory and enables the BLE-only controller and
    // Bluedroid.
    let bt = BtDriver::<Ble>::new(bt_modem, Some(nvs))?;
    unsafe {
        esp!(sys::esp_ble_gap_register_callback(Some(on_gap_event)))?;
    }
    info!("BLE controller initialized");

    Ok((EspStation { wifi }, EspDutyCycle, EspAdvertising { _bt: bt }))
}

/// Station capability over `EspWifi`.
pub struct EspStation {
    wifi: EspWifi<'static>,
}

impl StationRadio for EspStation {
    fn start(&mut self, credentials: &WifiConfig) -> Result<(), RadioError> {
        let auth_method = if credentials.is_open() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2WPA3Personal
        };

        let config = Configuration::Client(ClientConfiguration {
            ssid: credentials
                .ssid
                .as_str()
                .try_into()
                .map_err(|_| RadioError::Rejected("SSID too long".into()))?,
            password: credentials
                .password
                .as_str()
                .try_into()
                .map_err(|_| RadioError::Rejected("password too long".into()))?,
            auth_method,
            ..Default::default()
        });
        self.wifi.set_configuration(&config)?;

        // Modem sleep between beacons; required for TWT to save power.
        esp!(unsafe { sys::esp_wifi_set_ps(sys::wifi_ps_type_t_WIFI_PS_MIN_MODEM) })?;

        self.wifi.start()?;
        info!("WiFi started");
        Ok(())
    }

    fn connect(&mut self) -> Result<(), RadioError> {
        self.wifi.connect()?;
        Ok(())
    }
}

/// iTWT capability.
pub struct EspDutyCycle;

impl DutyCycleRadio for EspDutyCycle {
    fn request(&mut self, request: &DutyCycleRequest) -> Result<(), RadioError> {
        let setup_cmd = match request.negotiation_mode {
            NegotiationMode::RequestOnly => sys::wifi_twt_setup_cmds_t_TWT_REQUEST,
            NegotiationMode::Both => sys::wifi_twt_setup_cmds_t_TWT_SUGGEST,
            NegotiationMode::RespondOnly => {
                return Err(RadioError::Unsupported("TWT responder mode"))
            }
        };
        if !request.implicit_schedule {
            return Err(RadioError::Unsupported("explicit TWT schedule"));
        }

        // The driver counts the wake interval in µs.
        let (mantissa, exponent) = encode_micros(request.period_tu() * TU_MICROS);

        let mut config: sys::wifi_twt_setup_config_t = unsafe { core::mem::zeroed() };
        config.setup_cmd = setup_cmd;
        config.set_trigger(request.triggered as u16);
        // 0 = announced, 1 = unannounced
        config.set_flow_type(!request.announced as u16);
        config.set_flow_id(request.flow_id as u16);
        config.set_wake_invl_expn(exponent as u16);
        // wake duration in TU
        config.set_wake_duration_unit(1);
        config.min_wake_dura = request.wake_duration;
        config.wake_invl_mant = mantissa;
        config.timeout_time_ms = TWT_SETUP_TIMEOUT_MS;

        debug!(
            "esp_wifi_sta_itwt_setup: mant={} expn={} wake={}TU",
            mantissa, exponent, request.wake_duration
        );
        esp!(unsafe { sys::esp_wifi_sta_itwt_setup(&mut config) })?;
        Ok(())
    }
}

/// Extended advertising capability over Bluedroid GAP.
pub struct EspAdvertising {
    _bt: BtDriver<'static, Ble>,
}

impl AdvertisingRadio for EspAdvertising {
    fn issue(&mut self, command: &AdvCommand) -> Result<(), RadioError> {
        match command {
            AdvCommand::SetParams(params) => {
                let ext = ext_adv_params(params);
                esp!(unsafe { sys::esp_ble_gap_ext_adv_set_params(params.instance, &ext) })?;
            }
            AdvCommand::SetData { instance, payload } => {
                esp!(unsafe {
                    sys::esp_ble_gap_config_ext_adv_data_raw(
                        *instance,
                        payload.len() as u16,
                        payload.as_ptr(),
                    )
                })?;
            }
            AdvCommand::Start {
                instance,
                duration,
                max_events,
            } => {
                let adv = sys::esp_ble_gap_ext_adv_t {
                    instance: *instance,
                    duration: *duration as _,
                    max_events: *max_events,
                };
                esp!(unsafe { sys::esp_ble_gap_ext_adv_start(1, &adv) })?;
            }
        }
        Ok(())
    }
}

fn ext_adv_params(params: &AdvertisingParameters) -> sys::esp_ble_gap_ext_adv_params_t {
    let mut ext: sys::esp_ble_gap_ext_adv_params_t = unsafe { core::mem::zeroed() };
    ext.type_ = match params.mode {
        AdvertisingMode::NonConnectableNonScannable => {
            sys::ESP_BLE_GAP_SET_EXT_ADV_PROP_NONCONN_NONSCANNABLE_UNDIRECTED as _
        }
        AdvertisingMode::NonConnectableScannable => sys::ESP_BLE_GAP_SET_EXT_ADV_PROP_SCANNABLE as _,
        AdvertisingMode::Connectable => sys::ESP_BLE_GAP_SET_EXT_ADV_PROP_CONNECTABLE as _,
    };
    ext.interval_min = params.interval_min as _;
    ext.interval_max = params.interval_max as _;
    ext.channel_map = params.channel_map as _;
    ext.own_addr_type = match params.address_type {
        AddressType::Public => sys::esp_ble_addr_type_t_BLE_ADDR_TYPE_PUBLIC as _,
        AddressType::Random => sys::esp_ble_addr_type_t_BLE_ADDR_TYPE_RANDOM as _,
    };
    ext.filter_policy = match params.filter_policy {
        FilterPolicy::AllowAll => sys::esp_ble_adv_filter_t_ADV_FILTER_ALLOW_SCAN_ANY_CON_ANY as _,
        FilterPolicy::WhitelistScan => {
            sys::esp_ble_adv_filter_t_ADV_FILTER_ALLOW_SCAN_WLST_CON_ANY as _
        }
        FilterPolicy::WhitelistConnect => {
            sys::esp_ble_adv_filter_t_ADV_FILTER_ALLOW_SCAN_ANY_CON_WLST as _
        }
        FilterPolicy::WhitelistAll => {
            sys::esp_ble_adv_filter_t_ADV_FILTER_ALLOW_SCAN_WLST_CON_WLST as _
        }
    };
    ext.tx_power = match params.tx_power {
        TxPower::NoPreference => sys::EXT_ADV_TX_PWR_NO_PREFERENCE as _,
        TxPower::Dbm(dbm) => dbm,
    };
    ext.primary_phy = match params.primary_phy {
        PrimaryPhy::Le1M => sys::ESP_BLE_GAP_PRI_PHY_1M as _,
        PrimaryPhy::LeCoded => sys::ESP_BLE_GAP_PRI_PHY_CODED as _,
    };
    ext.secondary_phy = match params.secondary_phy {
        SecondaryPhy::Le1M => sys::ESP_BLE_GAP_PHY_1M as _,
        SecondaryPhy::Le2M => sys::ESP_BLE_GAP_PHY_2M as _,
        SecondaryPhy::LeCoded => sys::ESP_BLE_GAP_PHY_CODED as _,
    };
    ext.max_skip = 0;
    ext.sid = params.secondary_id;
    ext.scan_req_notif = false;
    ext
}

fn emit(event: RadioEvent) {
    match EVENTS.get() {
        Some(events) => {
            if events.send(event).is_err() {
                debug!("Dispatcher gone, radio event dropped");
            }
        }
        None => warn!("Radio event before init: {:?}", event),
    }
}

unsafe extern "C" fn on_wifi_event(
    _arg: *mut c_void,
    event_base: sys::esp_event_base_t,
    event_id: i32,
    event_data: *mut c_void,
) {
    let event = if event_base == sys::WIFI_EVENT {
        wifi_event(event_id as u32, event_data)
    } else if event_base == sys::IP_EVENT {
        ip_event(event_id as u32, event_data)
    } else {
        None
    };
    if let Some(event) = event {
        emit(event);
    }
}

unsafe fn wifi_event(event_id: u32, event_data: *mut c_void) -> Option<RadioEvent> {
    match event_id {
        sys::wifi_event_t_WIFI_EVENT_STA_START => Some(RadioEvent::Station(StationEvent::Started)),
        sys::wifi_event_t_WIFI_EVENT_STA_DISCONNECTED => {
            let reason = if event_data.is_null() {
                0
            } else {
                (*(event_data as *const sys::wifi_event_sta_disconnected_t)).reason as u16
            };
            Some(RadioEvent::Station(StationEvent::Disconnected { reason }))
        }
        sys::wifi_event_t_WIFI_EVENT_ITWT_SETUP => {
            if event_data.is_null() {
                return None;
            }
            let setup = &*(event_data as *const sys::wifi_event_sta_itwt_setup_t);
            Some(RadioEvent::DutyCycle(TwtEvent::SetupConfirmed(setup_status(setup))))
        }
        sys::wifi_event_t_WIFI_EVENT_ITWT_TEARDOWN => Some(RadioEvent::DutyCycle(TwtEvent::TornDown)),
        sys::wifi_event_t_WIFI_EVENT_ITWT_SUSPEND => {
            if event_data.is_null() {
                return None;
            }
            let suspend = &*(event_data as *const sys::wifi_event_sta_itwt_suspend_t);
            if suspend.status != sys::ESP_OK {
                warn!("iTWT suspend request failed, status {}", suspend.status);
                return None;
            }
            // A suspend with zero actual suspend time is the driver's resume.
            let suspended = suspend.actual_suspend_time_ms.iter().any(|ms| *ms > 0);
            Some(RadioEvent::DutyCycle(if suspended {
                TwtEvent::Suspended
            } else {
                TwtEvent::Resumed
            }))
        }
        _ => None,
    }
}

fn setup_status(setup: &sys::wifi_event_sta_itwt_setup_t) -> SetupStatus {
    let config = &setup.config;
    if setup.status != sys::ESP_OK {
        return SetupStatus::Declined(setup.status);
    }
    if config.setup_cmd == sys::wifi_twt_setup_cmds_t_TWT_REJECT {
        return SetupStatus::Declined(config.setup_cmd as i32);
    }

    let period_us = (config.wake_invl_mant as u64) << config.wake_invl_expn();
    // wake_duration_unit 0 counts 256 µs steps
    let wake_tu = if config.wake_duration_unit() == 1 {
        config.min_wake_dura
    } else {
        config.min_wake_dura / 4
    };
    SetupStatus::Accepted(AgreedSchedule::from_micros(
        period_us,
        wake_tu,
        config.flow_id() as u8,
    ))
}

unsafe fn ip_event(event_id: u32, event_data: *mut c_void) -> Option<RadioEvent> {
    if event_id != sys::ip_event_t_IP_EVENT_STA_GOT_IP || event_data.is_null() {
        return None;
    }
    let event = &*(event_data as *const sys::ip_event_got_ip_t);
    let ip = Ipv4Addr::from(event.ip_info.ip.addr.to_le_bytes());
    Some(RadioEvent::Station(StationEvent::GotIp { ip }))
}

unsafe extern "C" fn on_gap_event(
    event: sys::esp_gap_ble_cb_event_t,
    param: *mut sys::esp_ble_gap_cb_param_t,
) {
    if param.is_null() {
        return;
    }
    let (step, status) = match event {
        sys::esp_gap_ble_cb_event_t_ESP_GAP_BLE_EXT_ADV_SET_PARAMS_COMPLETE_EVT => {
            (AdvStep::SetParams, (*param).ext_adv_set_params.status)
        }
        sys::esp_gap_ble_cb_event_t_ESP_GAP_BLE_EXT_ADV_DATA_SET_COMPLETE_EVT => {
            (AdvStep::SetData, (*param).ext_adv_data_set.status)
        }
        sys::esp_gap_ble_cb_event_t_ESP_GAP_BLE_EXT_ADV_START_COMPLETE_EVT => {
            (AdvStep::Start, (*param).ext_adv_start.status)
        }
        _ => return,
    };

    let completion = if status == sys::esp_bt_status_t_ESP_BT_STATUS_SUCCESS {
        AdvCompletion::success(step)
    } else {
        AdvCompletion::failed(step, status as u32)
    };
    emit(RadioEvent::Advertising(completion));
}
