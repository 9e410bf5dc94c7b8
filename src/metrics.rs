//! Prometheus counters for the control channel, uploads and the background transfer queue.
//!
//! Without the `prometheus` feature all functions in here are no-ops.

use crate::server::controlchan::{command::Command, reply::Reply};

#[cfg(feature = "prometheus")]
mod collect {
    use super::{Command, Reply};

    use lazy_static::lazy_static;
    use prometheus::{IntCounter, IntCounterVec, opts, register_int_counter, register_int_counter_vec};

    lazy_static! {
        static ref FTP_COMMAND_TOTAL: IntCounterVec = register_int_counter_vec!("ftp_command_total", "Total number of commands received.", &["command"]).unwrap();
        static ref FTP_REPLY_TOTAL: IntCounterVec =
            register_int_counter_vec!("ftp_reply_total", "Total number of reply codes server sent to clients.", &["range"]).unwrap();
        static ref FTP_BACKEND_WRITE_FILES: IntCounter =
            register_int_counter!(opts!("ftp_backend_write_files", "Total number of files written to the backend.")).unwrap();
        static ref FTP_TRANSFERS_ABORTED: IntCounter =
            register_int_counter!(opts!("ftp_transfers_aborted_total", "Total number of transfers cancelled by the client.")).unwrap();
        static ref FTP_BACKGROUND_TRANSFER_TOTAL: IntCounterVec = register_int_counter_vec!(
            "ftp_background_transfer_total",
            "Total number of background transfers that ran to an end.",
            &["status"]
        )
        .unwrap();
    }

    pub fn add_command_metric(cmd: &Command) {
        FTP_COMMAND_TOTAL.with_label_values(&[&cmd.verb().to_lowercase()]).inc();
    }

    pub fn add_reply_metric(reply: &Reply) {
        let range = format!("{}xx", reply.code() as u32 / 100 % 10);
        FTP_REPLY_TOTAL.with_label_values(&[&range]).inc();
    }

    pub fn add_upload_metric() {
        FTP_BACKEND_WRITE_FILES.inc();
    }

    pub fn add_aborted_transfer_metric() {
        FTP_TRANSFERS_ABORTED.inc();
    }

    pub fn add_background_transfer_metric(succeeded: bool) {
        let status = if succeeded { "success" } else { "failure" };
        FTP_BACKGROUND_TRANSFER_TOTAL.with_label_values(&[status]).inc();
    }
}

#[cfg(not(feature = "prometheus"))]
mod collect {
    use super::{Command, Reply};

    pub fn add_command_metric(_cmd: &Command) {}

    pub fn add_reply_metric(_reply: &Reply) {}

    pub fn add_upload_metric() {}

    pub fn add_aborted_transfer_metric() {}

    pub fn add_background_transfer_metric(_succeeded: bool) {}
}

/// Add a metric for a command received on the control channel.
pub(crate) fn add_command_metric(cmd: &Command) {
    collect::add_command_metric(cmd)
}

/// Add a metric for a reply, counted per class (2xx, 5xx, ...).
pub(crate) fn add_reply_metric(reply: &Reply) {
    collect::add_reply_metric(reply)
}

/// Add a metric for an upload that completed.
pub(crate) fn add_upload_metric() {
    collect::add_upload_metric()
}

pub(crate) fn add_aborted_transfer_metric() {
    collect::add_aborted_transfer_metric()
}

pub(crate) fn add_background_transfer_metric(succeeded: bool) {
    collect::add_background_transfer_metric(succeeded)
}
