/*!
    The demux and decode loop, kept apart from FFmpeg so its packet
    handling can be driven by scripted inputs.
*/

use media_types::{Error, Result};

/// What the decoder said when asked for a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Received {
    Frame,
    NeedsInput,
    Finished,
}

/// What the decoder did with an offered packet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Offered {
    Accepted,
    /// The input queue is full; offer the packet again later.
    Full,
}

/**
    One demuxer feeding one decoder.
*/
pub(crate) trait PacketIo {
    type Packet;

    /// Next packet of any stream, `None` at end of input.
    fn read_packet(&mut self) -> Result<Option<Self::Packet>>;

    fn packet_stream(packet: &Self::Packet) -> usize;

    fn packet_size(packet: &Self::Packet) -> usize;

    fn receive_frame(&mut self) -> Result<Received>;

    fn send_packet(&mut self, packet: &Self::Packet) -> Result<Offered>;

    fn send_eof(&mut self) -> Result<()>;
}

/**
    Decode state that survives between calls: the selected stream, a packet
    the decoder refused, and whether end of stream was signalled.
*/
pub(crate) struct DecodeLoop<P> {
    stream_index: usize,
    pending: Option<P>,
    flushing: bool,
}

impl<P> DecodeLoop<P> {
    pub(crate) fn new(stream_index: usize) -> Self {
        Self {
            stream_index,
            pending: None,
            flushing: false,
        }
    }

    /**
        Feed the decoder until it holds a decoded frame.

        A failed packet is dropped and reported; the next call carries on
        with the following packet.
    */
    pub(crate) fn advance<I: PacketIo<Packet = P>>(&mut self, io: &mut I) -> Result<()> {
        let mut refused = false;

        loop {
            // A completed frame is always taken first
            match io.receive_frame()? {
                Received::Frame => return Ok(()),
                Received::Finished => return Err(Error::EndOfStream),
                Received::NeedsInput => {}
            }

            if self.flushing {
                // Input wanted after end of stream: nothing more will come out
                return Err(Error::EndOfStream);
            }

            let packet = match self.pending.take() {
                Some(packet) => packet,
                None => match self.read_video_packet(io)? {
                    Some(packet) => packet,
                    None => {
                        io.send_eof()?;
                        self.flushing = true;
                        continue;
                    }
                },
            };

            match io.send_packet(&packet)? {
                Offered::Accepted => refused = false,
                Offered::Full if refused => {
                    return Err(Error::FailedVideoDecoding(
                        "decoder neither accepts input nor produces frames".to_string(),
                    ));
                }
                Offered::Full => {
                    refused = true;
                    self.pending = Some(packet);
                }
            }
        }
    }

    /**
        Read packets until one carries data for the selected stream.

        Empty packets are skipped: the decoder would take one as an
        end-of-stream signal.
    */
    fn read_video_packet<I: PacketIo<Packet = P>>(&self, io: &mut I) -> Result<Option<P>> {
        while let Some(packet) = io.read_packet()? {
            if I::packet_stream(&packet) == self.stream_index && I::packet_size(&packet) > 0 {
                return Ok(Some(packet));
            }
        }
        Ok(None)
    }
}
