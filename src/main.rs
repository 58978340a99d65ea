fn main() {
    jukebox::app::startup::startup();
}
