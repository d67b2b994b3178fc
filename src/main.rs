#[macro_use]
extern crate rocket;

#[launch]
fn rocket() -> _ {
    let rocket = contacts_server::rocket();
    log::info!("Starting contacts import server");
    rocket
}
