pub mod between;
pub mod business_day;
pub mod ctor;
pub mod format;
pub mod today_now;

pub(crate) fn load_all() {
    today_now::load_all();
    ctor::load_all();
    between::load_all();
    business_day::load_all();
    format::load_all();
}
