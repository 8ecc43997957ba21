use broadside::poller::{Event, Interest, Poller};

fn pipe() -> (i32, i32) {
    let mut fds = [0i32; 2];
    let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
    assert_eq!(rc, 0, "pipe() failed");

    (fds[0], fds[1])
}

fn close(file_descriptor: i32) {
    unsafe {
        libc::close(file_descriptor);
    }
}

#[test]
fn reports_readable_bytes() {
    let mut poller = Poller::new().expect("create poller");
    let (read_end, write_end) = pipe();
    poller
        .register(read_end, Interest::READABLE)
        .expect("register");

    let wrote = unsafe { libc::write(write_end, b"hello".as_ptr() as *const _, 5) };
    assert_eq!(wrote, 5);

    let mut events = vec![Event::default(); 2];
    let count = poller.wait(&mut events).expect("wait");

    assert_eq!(count, 1);
    assert_eq!(events[0].file_descriptor(), read_end);
    assert_eq!(events[0].readable(), 5);
    assert!(!events[0].is_eof());
    assert_eq!(events[0].poll_error(), None);

    close(read_end);
    close(write_end);
}

#[test]
fn reports_half_close() {
    let mut poller = Poller::new().expect("create poller");

    let mut fds = [0i32; 2];
    let rc = unsafe { libc::socketpair(libc::AF_UNIX, libc::SOCK_STREAM, 0, fds.as_mut_ptr()) };
    assert_eq!(rc, 0, "socketpair() failed");
    let (local, remote) = (fds[0], fds[1]);

    poller.register(local, Interest::READABLE).expect("register");
    close(remote);

    let mut events = vec![Event::default(); 1];
    let count = poller.wait(&mut events).expect("wait");

    assert_eq!(count, 1);
    assert_eq!(events[0].file_descriptor(), local);
    assert!(events[0].is_eof());
    assert_eq!(events[0].readable(), 0);
    assert_eq!(events[0].error(), None);

    close(local);
}

#[test]
fn respects_buffer_capacity() {
    let mut poller = Poller::new().expect("create poller");
    let (first_read, first_write) = pipe();
    let (second_read, second_write) = pipe();

    poller
        .register(first_read, Interest::READABLE)
        .expect("register first");
    poller
        .register(second_read, Interest::READABLE)
        .expect("register second");

    unsafe {
        libc::write(first_write, b"a".as_ptr() as *const _, 1);
        libc::write(second_write, b"b".as_ptr() as *const _, 1);
    }

    let mut events = vec![Event::default(); 1];
    let count = poller.wait(&mut events).expect("wait");

    assert_eq!(count, 1, "a one-slot buffer yields at most one record");

    close(first_read);
    close(first_write);
    close(second_read);
    close(second_write);
}

#[test]
fn deregistered_descriptors_stay_silent() {
    let mut poller = Poller::new().expect("create poller");
    let (first_read, first_write) = pipe();
    let (second_read, second_write) = pipe();

    poller
        .register(first_read, Interest::READABLE)
        .expect("register first");
    poller
        .register(second_read, Interest::READABLE)
        .expect("register second");
    poller.deregister(first_read).expect("deregister first");

    unsafe {
        libc::write(first_write, b"a".as_ptr() as *const _, 1);
        libc::write(second_write, b"b".as_ptr() as *const _, 1);
    }

    let mut events = vec![Event::default(); 4];
    let count = poller.wait(&mut events).expect("wait");

    assert_eq!(count, 1);
    assert_eq!(events[0].file_descriptor(), second_read);

    close(first_read);
    close(first_write);
    close(second_read);
    close(second_write);
}
