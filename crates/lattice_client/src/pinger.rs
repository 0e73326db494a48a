//! Liveness prober. Sits quiet while traffic flows; after `interval` of
//! silence asks the session to send a lag-probe PING, and after another
//! `interval` without any traffic asks for a disconnect.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

pub(crate) struct Pinger {
    snd_rst: mpsc::Sender<()>,
}

#[derive(Debug)]
pub(crate) enum Event {
    SendPing,
    Disconnect,
}

enum PingerState {
    /// Signal a "ping" on timeout, move to `ExpectPong`.
    SendPing,
    /// Signal a "disconnect" on timeout.
    ExpectPong,
}

async fn pinger_task(interval: Duration, rcv_rst: mpsc::Receiver<()>, snd_ev: mpsc::Sender<Event>) {
    let mut rcv_rst_fused = ReceiverStream::new(rcv_rst).fuse();
    let mut state = PingerState::SendPing;
    loop {
        match timeout(interval, rcv_rst_fused.next()).await {
            Err(_) => match state {
                PingerState::SendPing => {
                    state = PingerState::ExpectPong;
                    let _ = snd_ev.try_send(Event::SendPing);
                }
                PingerState::ExpectPong => {
                    let _ = snd_ev.try_send(Event::Disconnect);
                    return;
                }
            },
            Ok(cmd) => match cmd {
                None => {
                    return;
                }
                Some(()) => {
                    state = PingerState::SendPing;
                }
            },
        }
    }
}

impl Pinger {
    pub(crate) fn new(interval: Duration) -> (Pinger, mpsc::Receiver<Event>) {
        let (snd_ev, rcv_ev) = mpsc::channel(1);
        let (snd_rst, rcv_rst) = mpsc::channel(1);
        tokio::task::spawn_local(pinger_task(interval, rcv_rst, snd_ev));
        (Pinger { snd_rst }, rcv_ev)
    }

    /// Note traffic; postpones the next probe.
    pub(crate) fn reset(&mut self) {
        // A reset already waiting to be processed is just as good.
        let _ = self.snd_rst.try_send(());
    }
}
