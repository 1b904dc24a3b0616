use std::convert::Infallible;
use iced::subscription::{self, Subscription};
use tokio_util::sync::CancellationToken;

use crate::config::types::SessionConfig;
use crate::device::btle::BtleChooser;
use crate::device::session::run_session;
use crate::device::types::DeviceEvent;

pub fn session_subscription(cancel: CancellationToken, config: SessionConfig) -> Subscription<DeviceEvent> {
    struct Session;

    subscription::channel(
        std::any::TypeId::of::<Session>(),
        64,
        move |subscription_sender| {
            async move {
                let chooser = BtleChooser::new(&config);
                run_session(chooser, config, cancel, vec![subscription_sender]).await;

                // note: subscription::channel expects the future to never resolve
                std::future::pending::<Infallible>().await
            }
        },
    )
}
