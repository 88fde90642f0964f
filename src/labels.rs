// Copyright 2024 Saorsa Labs Ltd.
//
// This Saorsa Network Software is licensed under the General Public License (GPL), version 3.
// Please see the file LICENSE-GPL, or visit <http://www.gnu.org/licenses/> for the full text.
//
// Full details available at https://saorsalabs.com/licenses

//! Human readable descriptions of server codes

const ALARMS: &[(&str, &str)] = &[
    ("no_uplink", "Server does not have any uplink connections."),
    (
        "packet_drop_hang",
        "Server has dropped packets due to forward time leaps or hangs caused by resource starvation.",
    ),
    (
        "packet_drop_future",
        "Server has dropped packets due to backward time leaps.",
    ),
];

const RX_ERRORS: &[(&str, &str)] = &[
    ("unknown", "Unknown error"),
    ("no_colon", "No colon (\":\") in packet"),
    ("no_dst", "No \">\" in packet to mark beginning of destination callsign"),
    ("no_path", "No path found between source callsign and \":\""),
    ("inv_srccall", "Invalid source callsign"),
    ("no_body", "No packet body/data after \":\""),
    ("inv_dstcall", "Invalid destination callsign"),
    ("disallow_unverified", "Packet from unverified local client"),
    ("disallow_unverified_path", "Packet from unverified client (TCPXX)"),
    ("path_nogate", "Packet with NOGATE/RFONLY in path"),
    ("party_3rd_ip", "3rd-party packet gated TCPIP>RF>TCPIP"),
    ("party_3rd_inv", "Invalid 3rd-party packet header"),
    ("general_query", "General query"),
    ("aprsc_oom_pbuf", "aprsc out of packet buffers"),
    ("aprsc_class_fail", "aprsc failed to classify packet"),
    ("aprsc_q_bug", "aprsc Q construct processing failed"),
    ("q_drop", "Q construct algorithm dropped packet"),
    ("short_packet", "Packet too short"),
    ("long_packet", "Packet too long"),
    ("inv_path_call", "Invalid callsign in path"),
    ("q_qax", "qAX: Packet from unverified remote client"),
    ("q_qaz", "qAZ construct"),
    ("q_path_mycall", "My ServerID in Q path"),
    ("q_path_call_twice", "Same callsign twice in the Q path"),
    ("q_path_login_not_last", "Local client login found but not last in Q path"),
    ("q_path_call_is_local", "Callsign in Q path is a local verified client"),
    ("q_path_call_inv", "Invalid callsign in Q path"),
    ("q_qau_path_call_srccall", "qAU callsign in path equals srccall"),
    ("q_newq_buffer_small", "New Q construct too big"),
    ("q_nonval_multi_q_calls", "Multiple callsigns in Q path from unverified client"),
    ("q_i_no_viacall", "I path has no viacall"),
    ("q_disallow_protocol", "Invalid protocol ID in Q construct"),
    ("inerr_empty", "Empty packet"),
    ("disallow_srccall", "Disallowed source callsign (N0CALL or such)"),
    ("disallow_dx", "DX cluster packet"),
    (
        "disallow_msg_dst",
        "Disallowed message recipient (javaMSG, JAVATITLE, USERLIST...)",
    ),
];

fn lookup(table: &'static [(&'static str, &'static str)], code: &str) -> Option<&'static str> {
    table.iter().find(|(c, _)| *c == code).map(|(_, text)| *text)
}

/// Description of an alarm code, falling back to the code itself
pub(crate) fn alarm(code: &str) -> String {
    lookup(ALARMS, code).map_or_else(|| code.to_string(), str::to_string)
}

/// Description of a receive error code, falling back to the code itself
pub(crate) fn rx_error(code: &str) -> String {
    lookup(RX_ERRORS, code).map_or_else(|| code.to_string(), str::to_string)
}
