#[macro_use]
extern crate rocket;

mod api;
mod app_state;
mod config;
mod engine;
mod error;
mod handler;
mod image_input;
mod prompt;
mod types;

use rocket::fairing::AdHoc;
use rocket::{Build, Rocket};

use app_state::AppState;
use config::Settings;

/// 启动时加载一次模型，失败则中止启动
async fn load_engine(rocket: Rocket<Build>) -> Result<Rocket<Build>, Rocket<Build>> {
    let settings: Settings = match rocket.figment().extract() {
        Ok(settings) => settings,
        Err(e) => {
            log::error!("invalid configuration: {e}");
            return Err(rocket);
        }
    };
    log::info!("loading {:?} engine `{}`", settings.engine, settings.model_id);

    // 下载 + mmap 权重都是阻塞操作，放到 blocking 线程池
    match tokio::task::spawn_blocking(move || AppState::load(settings)).await {
        Ok(Ok(state)) => Ok(rocket.manage(state)),
        Ok(Err(e)) => {
            log::error!("failed to load vision model: {e:#}");
            Err(rocket)
        }
        Err(e) => {
            log::error!("model loading task panicked: {e}");
            Err(rocket)
        }
    }
}

#[launch]
fn rocket() -> _ {
    rocket::build()
        .attach(AdHoc::try_on_ignite("Vision model", load_engine))
        .mount("/", api::routes())
}
